// FILE: src/extract/id3v1.rs
//! ID3v1: the fixed 128-byte `TAG` trailer, and the numbered genre table that
//! ID3v2 `TCON` frames still refer to as `(17)` or `17`.

use super::TagMap;
use std::fs::File;
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;

const TRAILER_LEN: u64 = 128;
const NO_GENRE: u8 = 255;

/// Winamp-extended ID3v1 genre list, indexed by genre number.
const GENRES: [&str; 192] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop",
    "Jazz", "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap",
    "Reggae", "Rock", "Techno", "Industrial", "Alternative", "Ska", "Death Metal", "Pranks",
    "Soundtrack", "Euro-Techno", "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance",
    "Classical", "Instrumental", "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise",
    "AlternRock", "Bass", "Soul", "Punk", "Space", "Meditative", "Instrumental Pop", "Instrumental Rock",
    "Ethnic", "Gothic", "Darkwave", "Techno-Industrial", "Electronic", "Pop-Folk", "Eurodance", "Dream",
    "Southern Rock", "Comedy", "Cult", "Gangsta", "Top 40", "Christian Rap", "Pop/Funk", "Jungle",
    "Native American", "Cabaret", "New Wave", "Psychadelic", "Rave", "Showtunes", "Trailer", "Lo-Fi",
    "Tribal", "Acid Punk", "Acid Jazz", "Polka", "Retro", "Musical", "Rock & Roll", "Hard Rock",
    "Folk", "Folk-Rock", "National Folk", "Swing", "Fast Fusion", "Bebob", "Latin", "Revival",
    "Celtic", "Bluegrass", "Avantgarde", "Gothic Rock", "Progressive Rock", "Psychedelic Rock", "Symphonic Rock", "Slow Rock",
    "Big Band", "Chorus", "Easy Listening", "Acoustic", "Humour", "Speech", "Chanson", "Opera",
    "Chamber Music", "Sonata", "Symphony", "Booty Bass", "Primus", "Porn Groove", "Satire", "Slow Jam",
    "Club", "Tango", "Samba", "Folklore", "Ballad", "Power Ballad", "Rhythmic Soul", "Freestyle",
    "Duet", "Punk Rock", "Drum Solo", "A capella", "Euro-House", "Dance Hall", "Goa", "Drum & Bass",
    "Club-House", "Hardcore", "Terror", "Indie", "BritPop", "Negerpunk", "Polsk Punk", "Beat",
    "Christian Gangsta Rap", "Heavy Metal", "Black Metal", "Crossover", "Contemporary Christian", "Christian Rock", "Merengue", "Salsa",
    "Thrash Metal", "Anime", "JPop", "Synthpop", "Abstract", "Art Rock", "Baroque", "Bhangra",
    "Big Beat", "Breakbeat", "Chillout", "Downtempo", "Dub", "EBM", "Eclectic", "Electro",
    "Electroclash", "Emo", "Experimental", "Garage", "Global", "IDM", "Illbient", "Industro-Goth",
    "Jam Band", "Krautrock", "Leftfield", "Lounge", "Math Rock", "New Romantic", "Nu-Breakz", "Post-Punk",
    "Post-Rock", "Psytrance", "Shoegaze", "Space Rock", "Trop Rock", "World Music", "Neoclassical", "Audiobook",
    "Audio Theatre", "Neue Deutsche Welle", "Podcast", "Indie-Rock", "G-Funk", "Dubstep", "Garage Rock", "Psybient",
];

pub fn genre_by_index(index: u8) -> Option<&'static str> {
    GENRES.get(usize::from(index)).copied()
}

/// Resolves numeric genre references: `(17)` and `17` become "Rock",
/// `(17)Rock` keeps its text, `(RX)`/`(CR)` are Remix/Cover. Anything else is
/// returned trimmed.
pub fn genre_name(raw: &str) -> String {
    let value = raw.trim();
    if let Some(rest) = value.strip_prefix('(') {
        if let Some((reference, refinement)) = rest.split_once(')') {
            let refinement = refinement.trim();
            if !refinement.is_empty() {
                return refinement.to_string();
            }
            match reference {
                "RX" => return "Remix".to_string(),
                "CR" => return "Cover".to_string(),
                _ => {}
            }
            if let Some(name) = reference.parse::<u8>().ok().and_then(genre_by_index) {
                return name.to_string();
            }
        }
        return value.to_string();
    }
    match value.parse::<u8>().ok().and_then(genre_by_index) {
        Some(name) => name.to_string(),
        None => value.to_string(),
    }
}

/// Reads the trailer at the end of `file`. `Ok(None)` when there is none.
pub fn read_trailer(file: &File) -> io::Result<Option<TagMap>> {
    let len = file.metadata()?.len();
    if len < TRAILER_LEN {
        return Ok(None);
    }

    let mut block = [0u8; TRAILER_LEN as usize];
    match file.read_exact_at(&mut block, len - TRAILER_LEN) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    Ok(parse_trailer(&block))
}

/// Layout: "TAG", title[30], artist[30], album[30], year[4], comment[30], genre[1].
fn parse_trailer(block: &[u8; TRAILER_LEN as usize]) -> Option<TagMap> {
    if &block[..3] != b"TAG" {
        return None;
    }

    let mut tags = TagMap::new();
    let mut put = |key: &str, value: String| {
        if !value.is_empty() {
            tags.insert(key.to_string(), value);
        }
    };
    put("title", latin1_field(&block[3..33]));
    put("artist", latin1_field(&block[33..63]));
    put("album", latin1_field(&block[63..93]));
    put("date", latin1_field(&block[93..97]));
    if block[127] != NO_GENRE {
        if let Some(name) = genre_by_index(block[127]) {
            put("genre", name.to_string());
        }
    }
    Some(tags)
}

/// NUL-padded ISO-8859-1 text.
fn latin1_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| char::from(b)).collect::<String>().trim().to_string()
}
