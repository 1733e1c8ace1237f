#![no_main]
use libfuzzer_sys::fuzz_target;
use solarmap::codec::{Codec, Ratio, decode};
use solarmap::registers::Encoding;

fuzz_target!(|data: &[u8]| {
    // First byte picks the word count, the rest is a big-endian register stream
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let regs: Vec<u16> = rest
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect();
    let width = usize::from(selector % 3);
    let words = &regs[..regs.len().min(width)];

    let scale = Ratio::new(1, 10).unwrap_or(Ratio::ONE);
    let encodings = [
        Encoding::UnsignedInt16,
        Encoding::UnsignedInt32,
        Encoding::SignedInt16,
        Encoding::SignedInt32,
        Encoding::scaled(scale),
        Encoding::signed_scaled(scale),
        Encoding::bit_enum(&[(0, "self_use"), (1, "feed_in_first")]),
        Encoding::TimeOfDay,
    ];
    // Flags normalize nonzero words to 1, so only decoding is checked
    let _ = decode(&Encoding::Flag, words);

    let codec = Codec::default();
    for encoding in &encodings {
        // Anything that decodes must encode back to the same words
        if let Ok(value) = decode(encoding, words) {
            let encoded = codec.encode(encoding, words.len() as u8, &value);
            assert_eq!(encoded.ok().as_deref(), Some(words));
        }
    }
});
