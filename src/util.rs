use bytes::Buf;

pub(crate) trait BufExt: Buf {
    /// Copies `size` bytes out of the buffer, or returns `None` (consuming
    /// nothing) if fewer than `size` bytes remain.
    fn get_vec_u8(&mut self, size: usize) -> Option<Vec<u8>> {
        if self.remaining() < size {
            return None;
        }

        let mut bytes = vec![0u8; size];
        self.copy_to_slice(&mut bytes[..]);
        Some(bytes)
    }

    fn get_bool(&mut self) -> bool {
        self.get_u8() != 0
    }
}

impl<B: Buf> BufExt for B {}

/// Converts the `-1` convention of libc calls into an [`std::io::Error`].
pub(crate) fn check_error<T: PartialOrd + Default>(value: T) -> Result<T, std::io::Error> {
    if value < T::default() {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(value)
    }
}
