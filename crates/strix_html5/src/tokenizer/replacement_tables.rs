use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// Numeric character references landing in the C1 control range are
    /// remapped to the characters a Windows-1252 author meant. Codes from the
    /// range that have no entry here stay as they are.
    pub static ref TOKEN_REPLACEMENTS: HashMap<u32, char> = HashMap::from([
        (0x80, '\u{20AC}'), // EURO SIGN
        (0x82, '\u{201A}'), // SINGLE LOW-9 QUOTATION MARK
        (0x83, '\u{0192}'), // LATIN SMALL LETTER F WITH HOOK
        (0x84, '\u{201E}'), // DOUBLE LOW-9 QUOTATION MARK
        (0x85, '\u{2026}'), // HORIZONTAL ELLIPSIS
        (0x86, '\u{2020}'), // DAGGER
        (0x87, '\u{2021}'), // DOUBLE DAGGER
        (0x88, '\u{02C6}'), // MODIFIER LETTER CIRCUMFLEX ACCENT
        (0x89, '\u{2030}'), // PER MILLE SIGN
        (0x8A, '\u{0160}'), // LATIN CAPITAL LETTER S WITH CARON
        (0x8B, '\u{2039}'), // SINGLE LEFT-POINTING ANGLE QUOTATION MARK
        (0x8C, '\u{0152}'), // LATIN CAPITAL LIGATURE OE
        (0x8E, '\u{017D}'), // LATIN CAPITAL LETTER Z WITH CARON
        (0x91, '\u{2018}'), // LEFT SINGLE QUOTATION MARK
        (0x92, '\u{2019}'), // RIGHT SINGLE QUOTATION MARK
        (0x93, '\u{201C}'), // LEFT DOUBLE QUOTATION MARK
        (0x94, '\u{201D}'), // RIGHT DOUBLE QUOTATION MARK
        (0x95, '\u{2022}'), // BULLET
        (0x96, '\u{2013}'), // EN DASH
        (0x97, '\u{2014}'), // EM DASH
        (0x98, '\u{02DC}'), // SMALL TILDE
        (0x99, '\u{2122}'), // TRADE MARK SIGN
        (0x9A, '\u{0161}'), // LATIN SMALL LETTER S WITH CARON
        (0x9B, '\u{203A}'), // SINGLE RIGHT-POINTING ANGLE QUOTATION MARK
        (0x9C, '\u{0153}'), // LATIN SMALL LIGATURE OE
        (0x9E, '\u{017E}'), // LATIN SMALL LETTER Z WITH CARON
        (0x9F, '\u{0178}'), // LATIN CAPITAL LETTER Y WITH DIAERESIS
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_table() {
        assert_eq!(TOKEN_REPLACEMENTS.get(&0x80), Some(&'\u{20AC}'));
        assert_eq!(TOKEN_REPLACEMENTS.get(&0x9F), Some(&'\u{0178}'));
        // 0x81, 0x8D, 0x8F, 0x90 and 0x9D have no Windows-1252 mapping
        assert_eq!(TOKEN_REPLACEMENTS.get(&0x81), None);
        assert_eq!(TOKEN_REPLACEMENTS.get(&0x9D), None);
        assert_eq!(TOKEN_REPLACEMENTS.len(), 27);
    }
}
