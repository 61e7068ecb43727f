//! # Dividers
//!
//! Top-level containers are sectioned under dividers. Containers that must
//! share a section produce the same divider key.
//!
//! - Text dimensions: the first character of the sort text with diacritics
//!   folded away. Digits collapse into `"0"`. A leading space (the
//!   `" unknown"` sort text) gets no divider.
//! - Years: the decade, zero-padded (`"1960"`).
//! - Year/album combinations: the exact year.
//! - Sample rate, bit depth, bit rate: the exact value.
//!
//! An unknown numeric value maps to `"0000"`, displayed as `Unknown`.

use crate::grouping::GroupBy;
use crate::text::{sort_text_for_number, UNKNOWN};
use core_library::Song;
use unicode_normalization::UnicodeNormalization;

const UNKNOWN_NUMBER_KEY: &str = "0000";

/// Divider key for a top-level container with the given sort text and
/// summary.
pub fn divider_key(group_by: GroupBy, sort_text: &str, summary: &Song) -> Option<String> {
    if sort_text.is_empty() {
        return None;
    }

    match group_by {
        GroupBy::None => None,
        GroupBy::Year => Some(decade(summary.year)),
        GroupBy::OriginalYear => Some(decade(summary.effective_original_year())),
        GroupBy::YearAlbum | GroupBy::YearAlbumDisc => {
            Some(sort_text_for_number(summary.year.max(0)))
        }
        GroupBy::OriginalYearAlbum | GroupBy::OriginalYearAlbumDisc => {
            Some(sort_text_for_number(summary.effective_original_year().max(0)))
        }
        GroupBy::Samplerate => Some(sort_text_for_number(summary.samplerate.max(0))),
        GroupBy::Bitdepth => Some(sort_text_for_number(summary.bitdepth.max(0))),
        GroupBy::Bitrate => Some(sort_text_for_number(summary.bitrate.max(0))),
        _ => first_letter(sort_text),
    }
}

fn decade(year: i32) -> String {
    sort_text_for_number(year.max(0) / 10 * 10)
}

fn first_letter(sort_text: &str) -> Option<String> {
    let first = sort_text.chars().next()?;
    if first.is_numeric() {
        return Some("0".to_string());
    }
    if first == ' ' {
        return None;
    }
    first.nfd().next().map(String::from)
}

/// Text shown for a divider.
pub fn divider_display_text(group_by: GroupBy, key: &str) -> String {
    if group_by.is_numeric() {
        if key == UNKNOWN_NUMBER_KEY {
            return UNKNOWN.to_string();
        }
        return key
            .parse::<i32>()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| key.to_string());
    }

    if key == "0" {
        "0-9".to_string()
    } else {
        key.to_uppercase()
    }
}
