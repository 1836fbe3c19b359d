//! Concatenation of fragments fetched from different tiers.

use picotherm_types::Series;

/// Result of [`concat`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Concatenated {
    /// The combined, strictly ascending series.
    pub series: Series,
    /// Points dropped because they did not come strictly after the data
    /// already accumulated (overlap at a seam between fragments).
    pub dropped: usize,
}

/// Concatenate fragments in the given order.
///
/// Each fragment must itself be strictly ascending (every [`Series`] is).
/// Where a fragment overlaps the tail of what came before, its overlapping
/// prefix is dropped and counted, so the result keeps the ordering invariant.
pub fn concat<I>(fragments: I) -> Concatenated
where
    I: IntoIterator<Item = Series>,
{
    let mut out = Concatenated::default();
    for fragment in fragments {
        out.dropped += out.series.extend_after(fragment);
    }
    out
}
