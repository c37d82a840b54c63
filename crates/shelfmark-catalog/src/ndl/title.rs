use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// Tried in order; the first that leaves a non-blank series title wins.
static VOLUME_SUFFIX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?P<series>.+?)[\s　]*第(?P<number>[0-9]+)巻$",
        r"^(?P<series>.+?)[\s　]*(?P<number>[0-9]+)巻$",
        r"(?i)^(?P<series>.+?)[\s　]+vol\.?[\s　]*(?P<number>[0-9]+)$",
        r"^(?P<series>.+?)[\s　]+(?P<number>[0-9]+)$",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid volume suffix regex"))
    .collect()
});

static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+").expect("valid integer regex"));

/// Split `"作品 第12巻"` into `("作品", Some(12))`. Titles without a
/// recognizable volume suffix come back whole.
pub fn split_title(title: &str) -> (String, Option<u32>) {
    let title = title.trim();
    for pattern in VOLUME_SUFFIX_PATTERNS.iter() {
        let Some(caps) = pattern.captures(title) else {
            continue;
        };
        let series = caps["series"].trim();
        if series.is_empty() {
            continue;
        }
        let Ok(number) = caps["number"].parse::<u32>() else {
            continue;
        };
        return (series.to_string(), Some(number));
    }
    (title.to_string(), None)
}

/// First integer in a volume designation such as `"第１２巻"` or `"上 3"`.
pub fn volume_number(text: &str) -> Option<u32> {
    let widened: String = text.nfkc().collect();
    FIRST_INTEGER
        .find(&widened)
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_known_suffixes() {
        assert_eq!(split_title("テスト作品 第12巻"), ("テスト作品".into(), Some(12)));
        assert_eq!(split_title("テスト作品第3巻"), ("テスト作品".into(), Some(3)));
        assert_eq!(split_title("検索テスト別作品 2巻"), ("検索テスト別作品".into(), Some(2)));
        assert_eq!(split_title("Series Vol. 7"), ("Series".into(), Some(7)));
        assert_eq!(split_title("Series vol 8"), ("Series".into(), Some(8)));
        assert_eq!(split_title("作品　4"), ("作品".into(), Some(4)));
    }

    #[test]
    fn leaves_plain_titles_alone() {
        assert_eq!(split_title(" 単行本 "), ("単行本".into(), None));
        assert_eq!(split_title("2001"), ("2001".into(), None));
        assert_eq!(split_title("Catch22"), ("Catch22".into(), None));
    }

    #[test]
    fn reads_full_width_volume_designation() {
        assert_eq!(volume_number("第１２巻"), Some(12));
        assert_eq!(volume_number("上巻"), None);
        assert_eq!(volume_number("3 (完)"), Some(3));
    }
}
