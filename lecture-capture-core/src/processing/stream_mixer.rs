/// Pure-math mixer for two 16-bit PCM streams.
///
/// Both inputs are interleaved little-endian `i16` byte buffers in the same
/// format. Mixing is sample-wise addition with saturation, so a loud
/// lecturer over loud system audio clips at the rails instead of wrapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamMixer;

impl StreamMixer {
    /// Mix two PCM chunks.
    ///
    /// Both buffers are truncated to the shorter common length (rounded down
    /// to a whole sample) before addition. Output length equals that length.
    /// Mixing against a zero buffer returns the other side unchanged.
    pub fn mix(a: &[u8], b: &[u8]) -> Vec<u8> {
        let len = a.len().min(b.len()) & !1;
        let mut mixed = Vec::with_capacity(len);
        for (x, y) in a[..len].chunks_exact(2).zip(b[..len].chunks_exact(2)) {
            let sum = i16::from_le_bytes([x[0], x[1]]).saturating_add(i16::from_le_bytes([y[0], y[1]]));
            mixed.extend_from_slice(&sum.to_le_bytes());
        }
        mixed
    }

    /// Decode little-endian PCM bytes into samples. A trailing odd byte is dropped.
    pub fn samples(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(2).map(|s| i16::from_le_bytes([s[0], s[1]])).collect()
    }

    /// Encode samples as little-endian PCM bytes.
    pub fn to_bytes(samples: &[i16]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        data
    }
}
