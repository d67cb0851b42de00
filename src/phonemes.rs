//! Phoneme inventory the classifier predicts over.

use ndarray::Axis;

use crate::types::FeatureTensor;

/// ARPAbet phonemes without stress markers, plus a silence class.
pub const PHONEMES: [&str; 40] = [
    "aa", "ae", "ah", "ao", "aw", "ay", "b", "ch", "d", "dh", "eh", "er", "ey", "f", "g", "hh",
    "ih", "iy", "jh", "k", "l", "m", "n", "ng", "ow", "oy", "p", "r", "s", "sh", "t", "th", "uh",
    "uw", "v", "w", "y", "z", "zh", "<silent>",
];

pub const SILENCE: &str = "<silent>";

pub fn index_of(symbol: &str) -> Option<usize> {
    PHONEMES.iter().position(|&p| p == symbol)
}

/// Most likely phoneme per frame of a PPG whose channels follow [`PHONEMES`].
///
/// Frames whose argmax falls outside the inventory decode as `None`.
pub fn most_likely(ppg: &FeatureTensor) -> Vec<Option<&'static str>> {
    ppg.data()
        .axis_iter(Axis(0))
        .map(|frame| {
            frame
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, f32)>, (i, &p)| match best {
                    Some((_, bp)) if bp >= p => best,
                    _ => Some((i, p)),
                })
                .and_then(|(i, _)| PHONEMES.get(i).copied())
        })
        .collect()
}

/// Collapse consecutive repeats, e.g. for printing a readable transcription.
pub fn collapse_repeats<'a>(frames: &[Option<&'a str>]) -> Vec<&'a str> {
    let mut out: Vec<&'a str> = Vec::new();
    for &symbol in frames.iter().flatten() {
        if out.last() != Some(&symbol) {
            out.push(symbol);
        }
    }
    out
}
