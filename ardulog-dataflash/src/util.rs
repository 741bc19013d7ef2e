use bytes::Buf;

pub trait BufReadBytesExt {
    fn get_bytes<const N: usize>(&mut self) -> [u8; N];

    /// Reads a fixed-width, NUL-padded string.
    fn get_padded_str<const N: usize>(&mut self) -> String {
        decode_padded_str(&self.get_bytes::<N>())
    }
}

impl<B: Buf> BufReadBytesExt for B {
    fn get_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut data: [u8; N] = [0; N];
        self.copy_to_slice(&mut data[..]);
        data
    }
}

/// Decodes text, trimming trailing NUL padding only.
pub fn decode_padded_str(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|byte| *byte != 0)
        .map_or(0, |index| index + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use crate::util::decode_padded_str;

    #[test]
    fn it_trims_only_trailing_nuls() {
        assert_eq!(decode_padded_str(b"ATT\0"), "ATT");
        assert_eq!(decode_padded_str(b"A\0B\0\0\0"), "A\0B");
        assert_eq!(decode_padded_str(b"\0\0\0\0"), "");
        assert_eq!(decode_padded_str(b"GPS "), "GPS ");
    }
}
