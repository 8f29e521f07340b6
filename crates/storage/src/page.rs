use cranedb_core::StorageError;

/// One block's worth of bytes held in memory. Values are written with fixed
/// encodings: 32-bit big-endian signed integers, and byte arrays / UTF-8
/// strings behind a u32 big-endian length prefix.
///
/// Offsets come from layouts or the log manager's boundary arithmetic, so
/// out-of-range access is a caller bug and panics via slice indexing.
#[derive(Debug, Clone)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size],
        }
    }

    /// Wrap an existing byte image, e.g. a log record, for typed access.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    pub fn get_int(&self, offset: usize) -> i32 {
        let raw: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        i32::from_be_bytes(raw)
    }

    pub fn set_int(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn get_bytes(&self, offset: usize) -> &[u8] {
        let len = u32::from_be_bytes(self.data[offset..offset + 4].try_into().unwrap()) as usize;
        &self.data[offset + 4..offset + 4 + len]
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) {
        let len = bytes.len() as u32;
        self.data[offset..offset + 4].copy_from_slice(&len.to_be_bytes());
        self.data[offset + 4..offset + 4 + bytes.len()].copy_from_slice(bytes);
    }

    pub fn get_string(&self, offset: usize) -> Result<String, StorageError> {
        String::from_utf8(self.get_bytes(offset).to_vec())
            .map_err(|_| StorageError::corrupt(format!("non-utf8 string at offset {offset}")))
    }

    pub fn set_string(&mut self, offset: usize, value: &str) {
        self.set_bytes(offset, value.as_bytes());
    }

    /// Bytes needed to store a string of the given byte length, including
    /// the length prefix.
    pub const fn max_length(str_len: usize) -> usize {
        4 + str_len
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reset every byte to zero.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}
