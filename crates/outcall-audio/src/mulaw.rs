//! G.711 µ-law codec and 20 ms wire framing.
//!
//! The carrier wire format is µ-law, 8 kHz, mono: one byte per sample,
//! 160 samples per 20 ms frame. Encoding and decoding form an exact pair:
//! re-encoding a decoded frame reproduces the original bytes, including
//! the negative-zero code.

/// Samples (= bytes) per second on the wire.
pub const SAMPLE_RATE: usize = 8000;

/// Bytes per 20 ms frame.
pub const FRAME_BYTES: usize = 160;

/// µ-law code for a zero-amplitude sample. Used to pad partial frames.
pub const SILENCE: u8 = 0xFF;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;

/// Encodes one linear PCM16 sample to its µ-law code.
pub fn encode_sample(pcm: i16) -> u8 {
    let mut sample = i32::from(pcm);
    let sign: u8 = if sample < 0 {
        sample = -sample;
        0x80
    } else {
        0
    };
    if sample > CLIP {
        sample = CLIP;
    }
    sample += BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (sample & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((sample >> (exponent + 3)) & 0x0F) as u8;

    !(sign | (exponent << 4) | mantissa)
}

/// Decodes one µ-law code to a linear PCM16 sample.
pub fn decode_sample(code: u8) -> i16 {
    let inverted = !code;
    let sign = inverted & 0x80;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;

    let magnitude = ((i32::from(mantissa) << 3) + BIAS) << exponent;
    if sign != 0 {
        // Negative zero (0x7F) maps to -1 so the code stays distinct from
        // positive zero when re-encoded.
        ((BIAS - magnitude).min(-1)) as i16
    } else {
        (magnitude - BIAS) as i16
    }
}

/// Encodes a PCM16 buffer to µ-law bytes.
pub fn encode_pcm16(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().copied().map(encode_sample).collect()
}

/// Decodes a µ-law buffer to PCM16 samples.
pub fn decode_mulaw(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().copied().map(decode_sample).collect()
}

/// Splits a µ-law byte stream into 20 ms frames, padding the final
/// partial frame with silence.
pub fn frame(mulaw: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::with_capacity(mulaw.len().div_ceil(FRAME_BYTES));
    for chunk in mulaw.chunks(FRAME_BYTES) {
        let mut frame = chunk.to_vec();
        frame.resize(FRAME_BYTES, SILENCE);
        frames.push(frame);
    }
    frames
}

/// Whole seconds of playback for a µ-law byte count, rounded up.
pub fn playback_seconds(mulaw_len: usize) -> u64 {
    (mulaw_len.div_ceil(SAMPLE_RATE)) as u64
}
