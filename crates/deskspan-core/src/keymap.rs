//! Layout-independent key translation.
//!
//! Remote clients may run a different keyboard layout than the server, so the
//! virtual-key code captured by the hook cannot be forwarded as-is: pressing
//! the physical "Q" key on an AZERTY server would type "A" on a QWERTY
//! client.  The hardware scan code identifies the physical key position, and
//! this table maps it to the US-layout virtual-key code, which is what goes
//! on the wire.
//!
//! Scan codes outside the table (navigation cluster, media keys, …) already
//! carry a position-independent virtual-key code and pass through unchanged.

/// Maps a hardware scan code to the US-layout virtual-key code.
///
/// `vk` is the layout-dependent code reported by the hook and is returned
/// unchanged for keys the table does not cover.  `extended` distinguishes
/// keys that share a scan code, such as main Return versus keypad Enter.
pub fn layout_independent_vk(scan_code: u32, vk: u32, extended: bool) -> u32 {
    match (scan_code, extended) {
        // a-z
        (0x1E, _) => 0x41,
        (0x30, _) => 0x42,
        (0x2E, _) => 0x43,
        (0x20, _) => 0x44,
        (0x12, _) => 0x45,
        (0x21, _) => 0x46,
        (0x22, _) => 0x47,
        (0x23, _) => 0x48,
        (0x17, _) => 0x49,
        (0x24, _) => 0x4A,
        (0x25, _) => 0x4B,
        (0x26, _) => 0x4C,
        (0x32, _) => 0x4D,
        (0x31, _) => 0x4E,
        (0x18, _) => 0x4F,
        (0x19, _) => 0x50,
        (0x10, _) => 0x51,
        (0x13, _) => 0x52,
        (0x1F, _) => 0x53,
        (0x14, _) => 0x54,
        (0x16, _) => 0x55,
        (0x2F, _) => 0x56,
        (0x11, _) => 0x57,
        (0x2D, _) => 0x58,
        (0x15, _) => 0x59,
        (0x2C, _) => 0x5A,
        // digit row 0-9
        (0x0B, _) => 0x30,
        (0x02, _) => 0x31,
        (0x03, _) => 0x32,
        (0x04, _) => 0x33,
        (0x05, _) => 0x34,
        (0x06, _) => 0x35,
        (0x07, _) => 0x36,
        (0x08, _) => 0x37,
        (0x09, _) => 0x38,
        (0x0A, _) => 0x39,
        // OEM punctuation block
        (0x27, _) => 0xBA,
        (0x0D, _) => 0xBB,
        (0x33, _) => 0xBC,
        (0x0C, _) => 0xBD,
        (0x34, _) => 0xBE,
        (0x35, false) => 0xBF,
        (0x29, _) => 0xC0,
        (0x1A, _) => 0xDB,
        (0x2B, _) => 0xDC,
        (0x1B, _) => 0xDD,
        (0x28, _) => 0xDE,
        // OEM 102 (the extra key on ISO boards)
        (0x56, _) => 0xE2,
        // left side system keys
        (0x01, _) => 0x1B, // escape
        (0x0F, _) => 0x09, // tab
        (0x3A, _) => 0x14, // caps lock
        (0x2A, _) => 0xA0, // left shift
        // right side system keys
        (0x0E, false) => 0x08, // backspace
        (0x1C, false) => 0x0D, // return
        (0x36, _) => 0xA1,     // right shift
        // numeric keypad
        (0x1C, true) => 0x0A, // keypad enter
        (0x35, true) => vk,   // keypad divide is already layout independent
        // F1-F12
        (0x3B, _) => 0x70,
        (0x3C, _) => 0x71,
        (0x3D, _) => 0x72,
        (0x3E, _) => 0x73,
        (0x3F, _) => 0x74,
        (0x40, _) => 0x75,
        (0x41, _) => 0x76,
        (0x42, _) => 0x77,
        (0x43, _) => 0x78,
        (0x44, _) => 0x79,
        (0x57, _) => 0x7A,
        (0x58, _) => 0x7B,

        _ => vk,
    }
}
