use crate::models::Volume;

/// Pick the cover that represents a series in the library overview.
///
/// Volume 1 with a cover wins; otherwise the earliest registered volume with a
/// cover. Blank URLs count as missing. Always computed from the current
/// volume set, never stored.
pub fn representative_cover(volumes: &[Volume]) -> Option<&str> {
    volumes
        .iter()
        .filter_map(|volume| volume.cover().map(|cover| (volume, cover)))
        .min_by(|(a, _), (b, _)| {
            let a_key = (a.volume_number != Some(1), a.registered_at, &a.isbn);
            let b_key = (b.volume_number != Some(1), b.registered_at, &b.isbn);
            a_key.cmp(&b_key)
        })
        .map(|(_, cover)| cover)
}
