//! Standard base font handling
//!
//! Overlay text is drawn with the PDF standard Helvetica family, which every
//! conforming reader provides, so no font program is embedded. Glyph widths
//! come from the Helvetica AFM metrics and are used for alignment only.

use crate::{PdfError, Result};
use lopdf::{dictionary, Dictionary};

/// Font weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

/// Font style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// A variant of the standard Helvetica family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BaseFont {
    pub weight: FontWeight,
    pub style: FontStyle,
}

impl BaseFont {
    /// Regular Helvetica
    pub fn regular() -> Self {
        Self::default()
    }

    /// Pick the family variant matching the bold/italic flags
    pub fn with_flags(bold: bool, italic: bool) -> Self {
        Self {
            weight: if bold {
                FontWeight::Bold
            } else {
                FontWeight::Regular
            },
            style: if italic {
                FontStyle::Italic
            } else {
                FontStyle::Normal
            },
        }
    }

    /// PostScript name of the variant (the `/BaseFont` entry)
    pub fn postscript_name(&self) -> &'static str {
        match (self.weight, self.style) {
            (FontWeight::Regular, FontStyle::Normal) => "Helvetica",
            (FontWeight::Bold, FontStyle::Normal) => "Helvetica-Bold",
            (FontWeight::Regular, FontStyle::Italic) => "Helvetica-Oblique",
            (FontWeight::Bold, FontStyle::Italic) => "Helvetica-BoldOblique",
        }
    }

    /// Font dictionary for the page resources
    pub fn to_pdf_dictionary(&self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.postscript_name(),
            "Encoding" => "WinAnsiEncoding",
        }
    }

    /// Text width in points at the given size
    ///
    /// Bold and oblique variants reuse the regular metrics; the result is an
    /// approximation good enough for alignment inside a box.
    pub fn text_width_points(&self, text: &str, size: f32) -> f64 {
        let units: u32 = text
            .chars()
            .map(|c| win_ansi_byte(c).map_or(DEFAULT_GLYPH_WIDTH, glyph_width) as u32)
            .sum();
        units as f64 * size as f64 / 1000.0
    }
}

/// Helvetica advance widths for the printable ASCII range (0x20..=0x7E)
const HELVETICA_ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

/// Width of the average lowercase glyph, used outside the ASCII table
const DEFAULT_GLYPH_WIDTH: u16 = 556;

fn glyph_width(byte: u8) -> u16 {
    match byte {
        0x20..=0x7E => HELVETICA_ASCII_WIDTHS[(byte - 0x20) as usize],
        0xA0 => 278,
        _ => DEFAULT_GLYPH_WIDTH,
    }
}

/// Encode text into WinAnsiEncoding bytes
///
/// Latin-1 characters map directly and the typographic characters WinAnsi
/// places in 0x80..0x9F are remapped. Fails on the first character the
/// standard fonts cannot show.
pub fn encode_win_ansi(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| win_ansi_byte(c).ok_or(PdfError::UnsupportedCharacter(c)))
        .collect()
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        '\u{20}'..='\u{7E}' | '\u{A0}'..='\u{FF}' => c as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        '\t' => b' ',
        _ => return None,
    };
    Some(byte)
}
