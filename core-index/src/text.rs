//! # Node text
//!
//! Pure functions producing the key, display text and sort text of index
//! nodes from a song.
//!
//! - **Key**: identifies a container among its siblings. Equal group values
//!   always produce equal keys.
//! - **Display text**: what a view shows.
//! - **Sort text**: orders siblings. Lowercased, punctuation stripped,
//!   leading articles moved to the end, numbers zero-padded.

use crate::grouping::GroupBy;
use core_library::Song;
use regex::Regex;
use std::sync::OnceLock;

pub const UNKNOWN: &str = "Unknown";
pub const VARIOUS_ARTISTS: &str = "Various artists";
pub const VARIOUS_ARTISTS_SORT: &str = " various";

const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w ]").expect("valid regex"))
}

/// Albums whose title already names the disc, e.g. `Abbey Road (Disc 1)`.
fn album_names_disc() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[(\[]*(disc|cd)\s*[0-9]{1,2}[)\]]*$").expect("valid regex"))
}

pub fn text_or_unknown(text: &str) -> String {
    if text.is_empty() {
        UNKNOWN.to_string()
    } else {
        text.to_string()
    }
}

pub fn pretty_year_album(year: i32, album: &str) -> String {
    if year <= 0 {
        text_or_unknown(album)
    } else {
        format!("{year} - {}", text_or_unknown(album))
    }
}

pub fn pretty_album_disc(album: &str, disc: i32) -> String {
    if disc <= 0 || album_names_disc().is_match(album) {
        text_or_unknown(album)
    } else {
        format!("{} - (Disc {disc})", text_or_unknown(album))
    }
}

pub fn pretty_year_album_disc(year: i32, album: &str, disc: i32) -> String {
    let mut text = pretty_year_album(year, album);
    if disc > 0 && !album_names_disc().is_match(album) {
        text.push_str(&format!(" - (Disc {disc})"));
    }
    text
}

pub fn pretty_disc(disc: i32) -> String {
    format!("Disc {}", disc.max(1))
}

/// Lowercase and strip everything but word characters and spaces.
/// Empty text sorts as `" unknown"`, ahead of any letter.
pub fn sort_text(text: &str) -> String {
    if text.is_empty() {
        return " unknown".to_string();
    }
    non_word().replace_all(&text.to_lowercase(), "").into_owned()
}

/// [`sort_text`] with a leading article moved to the end:
/// `"The Beatles"` sorts as `"beatles, the"`.
pub fn sort_text_for_artist(text: &str) -> String {
    let sorted = sort_text(text);
    for article in ARTICLES {
        if let Some(rest) = sorted.strip_prefix(article) {
            return format!("{rest}, {}", article.trim_end());
        }
    }
    sorted
}

/// Zero-padded to four digits.
pub fn sort_text_for_number(number: i32) -> String {
    format!("{number:04}")
}

/// `disc * 1000 + track` padded to six digits, then the URL.
pub fn sort_text_for_song(song: &Song) -> String {
    let position = song.disc.max(0) * 1000 + song.track.max(0);
    format!("{position:06}{}", song.url)
}

/// Title, falling back to the file name. Compilation tracks are prefixed
/// with their artist unless it already reads as "various".
pub fn song_display_text(song: &Song) -> String {
    let title = if song.title.is_empty() {
        song.url.rsplit('/').next().unwrap_or_default().to_string()
    } else {
        song.title.clone()
    };

    if song.is_compilation()
        && !song.artist.is_empty()
        && !song.artist.to_lowercase().contains("various")
    {
        format!("{} - {title}", song.artist)
    } else {
        title
    }
}

/// `FLAC (44.1/16)`, `MP3 (48)` or just the file type when the sample rate
/// is unknown.
fn format_text(song: &Song) -> String {
    let filetype = song.text_for_filetype();
    if song.samplerate <= 0 {
        return filetype;
    }
    let khz = f64::from(song.samplerate) / 1000.0;
    if song.bitdepth <= 0 {
        format!("{filetype} ({khz})")
    } else {
        format!("{filetype} ({khz}/{})", song.bitdepth)
    }
}

/// This level's share of a container key.
pub fn container_key(group_by: GroupBy, song: &Song) -> String {
    match group_by {
        GroupBy::AlbumArtist => text_or_unknown(song.effective_albumartist()),
        GroupBy::Artist => text_or_unknown(&song.artist),
        GroupBy::Album => text_or_unknown(&song.album),
        GroupBy::AlbumDisc => pretty_album_disc(&song.album, song.disc),
        GroupBy::YearAlbum => pretty_year_album(song.year, &song.album),
        GroupBy::YearAlbumDisc => pretty_year_album_disc(song.year, &song.album, song.disc),
        GroupBy::OriginalYearAlbum => {
            pretty_year_album(song.effective_original_year(), &song.album)
        }
        GroupBy::OriginalYearAlbumDisc => {
            pretty_year_album_disc(song.effective_original_year(), &song.album, song.disc)
        }
        GroupBy::Disc => pretty_disc(song.disc),
        GroupBy::Year => song.year.max(0).to_string(),
        GroupBy::OriginalYear => song.effective_original_year().max(0).to_string(),
        GroupBy::Genre => text_or_unknown(&song.genre),
        GroupBy::Composer => text_or_unknown(&song.composer),
        GroupBy::Performer => text_or_unknown(&song.performer),
        GroupBy::Grouping => text_or_unknown(&song.grouping),
        GroupBy::FileType => song.text_for_filetype(),
        GroupBy::Format => format_text(song),
        GroupBy::Samplerate => song.samplerate.max(0).to_string(),
        GroupBy::Bitdepth => song.bitdepth.max(0).to_string(),
        GroupBy::Bitrate => song.bitrate.max(0).to_string(),
        GroupBy::None => text_or_unknown(&song.title),
    }
}

pub fn container_display_text(group_by: GroupBy, song: &Song) -> String {
    match group_by {
        GroupBy::Year
        | GroupBy::OriginalYear
        | GroupBy::Samplerate
        | GroupBy::Bitdepth
        | GroupBy::Bitrate => {
            let key = container_key(group_by, song);
            if key == "0" {
                UNKNOWN.to_string()
            } else {
                key
            }
        }
        GroupBy::None => song_display_text(song),
        _ => container_key(group_by, song),
    }
}

pub fn container_sort_text(group_by: GroupBy, song: &Song) -> String {
    match group_by {
        GroupBy::AlbumArtist => sort_text_for_artist(song.effective_albumartist()),
        GroupBy::Artist => sort_text_for_artist(&song.artist),
        GroupBy::Album => sort_text_for_artist(&song.album),
        GroupBy::Genre => sort_text_for_artist(&song.genre),
        GroupBy::Composer => sort_text_for_artist(&song.composer),
        GroupBy::Performer => sort_text_for_artist(&song.performer),
        GroupBy::Grouping => sort_text_for_artist(&song.grouping),
        GroupBy::AlbumDisc => format!("{}{}", song.album, sort_text_for_number(song.disc.max(0))),
        GroupBy::YearAlbum => format!(
            "{}{}{}",
            sort_text_for_number(song.year.max(0)),
            song.grouping,
            song.album
        ),
        GroupBy::YearAlbumDisc => format!(
            "{}{}{}",
            sort_text_for_number(song.year.max(0)),
            song.album,
            sort_text_for_number(song.disc.max(0))
        ),
        GroupBy::OriginalYearAlbum => format!(
            "{}{}{}",
            sort_text_for_number(song.effective_original_year().max(0)),
            song.grouping,
            song.album
        ),
        GroupBy::OriginalYearAlbumDisc => format!(
            "{}{}{}",
            sort_text_for_number(song.effective_original_year().max(0)),
            song.album,
            sort_text_for_number(song.disc.max(0))
        ),
        GroupBy::Disc => sort_text_for_number(song.disc.max(0)),
        GroupBy::Year => format!("{} ", sort_text_for_number(song.year.max(0))),
        GroupBy::OriginalYear => {
            format!("{} ", sort_text_for_number(song.effective_original_year().max(0)))
        }
        GroupBy::Samplerate => format!("{} ", sort_text_for_number(song.samplerate.max(0))),
        GroupBy::Bitdepth => format!("{} ", sort_text_for_number(song.bitdepth.max(0))),
        GroupBy::Bitrate => format!("{} ", sort_text_for_number(song.bitrate.max(0))),
        GroupBy::FileType => song.text_for_filetype(),
        GroupBy::Format => format_text(song),
        GroupBy::None => sort_text_for_song(song),
    }
}

/// Copy of `song` keeping only the fields a container at `group_by`
/// summarizes.
pub fn container_summary(group_by: GroupBy, song: &Song) -> Song {
    let mut summary = Song::default();
    match group_by {
        GroupBy::AlbumArtist => summary.album_artist = song.effective_albumartist().to_string(),
        GroupBy::Artist => summary.artist = song.artist.clone(),
        GroupBy::Album => summary.album = song.album.clone(),
        GroupBy::AlbumDisc => {
            summary.album = song.album.clone();
            summary.disc = song.disc;
        }
        GroupBy::YearAlbum | GroupBy::OriginalYearAlbum => {
            summary.year = song.year;
            summary.original_year = song.original_year;
            summary.album = song.album.clone();
            summary.grouping = song.grouping.clone();
        }
        GroupBy::YearAlbumDisc | GroupBy::OriginalYearAlbumDisc => {
            summary.year = song.year;
            summary.original_year = song.original_year;
            summary.album = song.album.clone();
            summary.disc = song.disc;
        }
        GroupBy::Disc => summary.disc = song.disc,
        GroupBy::Year => summary.year = song.year,
        GroupBy::OriginalYear => summary.original_year = song.effective_original_year(),
        GroupBy::Genre => summary.genre = song.genre.clone(),
        GroupBy::Composer => summary.composer = song.composer.clone(),
        GroupBy::Performer => summary.performer = song.performer.clone(),
        GroupBy::Grouping => summary.grouping = song.grouping.clone(),
        GroupBy::FileType => summary.filetype = song.filetype.clone(),
        GroupBy::Format => {
            summary.filetype = song.filetype.clone();
            summary.samplerate = song.samplerate;
            summary.bitdepth = song.bitdepth;
        }
        GroupBy::Samplerate => summary.samplerate = song.samplerate,
        GroupBy::Bitdepth => summary.bitdepth = song.bitdepth,
        GroupBy::Bitrate => summary.bitrate = song.bitrate,
        GroupBy::None => return song.clone(),
    }
    summary
}
