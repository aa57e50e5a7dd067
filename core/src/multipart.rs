//! `multipart/form-data` framing for single-file media uploads.
//!
//! The body is one part named `media`:
//!
//! ```text
//! --<BOUNDARY>\r\n
//! Content-Disposition: form-data; name="media"; filename="<name>"\r\n
//! \r\n
//! <file bytes>\r\n
//! --<BOUNDARY>--\r\n
//! ```
//!
//! The file is never buffered whole: `into_reader` chains the preamble, the
//! file (read in `CHUNK_SIZE` pieces) and the epilogue, and the exact total is
//! known up front for `Content-Length`.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use crate::error::WeixinError;

/// Shared by every upload.
pub const BOUNDARY: &str = "----WebKitFormBoundaryiDGnV9zdZA1eM1yL";

pub const FIELD_NAME: &str = "media";

pub const CHUNK_SIZE: usize = 8 * 1024;

pub fn content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

pub struct MultipartBody<R> {
    preamble: Vec<u8>,
    file: R,
    file_len: u64,
    epilogue: Vec<u8>,
}

impl MultipartBody<File> {
    /// Open `path` for upload; the part's filename is the path's last component.
    pub fn open(path: &Path) -> Result<Self, WeixinError> {
        let file = File::open(path)
            .map_err(|e| WeixinError::transport(format!("cannot open {}", path.display()), e))?;
        let file_len = file
            .metadata()
            .map_err(|e| WeixinError::transport(format!("cannot stat {}", path.display()), e))?
            .len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(&file_name, file, file_len))
    }
}

impl<R: Read> MultipartBody<R> {
    /// Frame `file_len` bytes of `file` under `file_name`.
    pub fn new(file_name: &str, file: R, file_len: u64) -> Self {
        let preamble = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{FIELD_NAME}\"; filename=\"{}\"\r\n\r\n",
            escape_quotes(file_name)
        )
        .into_bytes();
        let epilogue = format!("\r\n--{BOUNDARY}--\r\n").into_bytes();
        Self {
            preamble,
            file,
            file_len,
            epilogue,
        }
    }

    /// Exact number of bytes `into_reader` yields.
    pub fn content_length(&self) -> u64 {
        self.preamble.len() as u64 + self.file_len + self.epilogue.len() as u64
    }

    pub fn into_reader(self) -> impl Read {
        // `take` pins the file part to the length announced in Content-Length.
        let file = BufReader::with_capacity(CHUNK_SIZE, self.file.take(self.file_len));
        Cursor::new(self.preamble)
            .chain(file)
            .chain(Cursor::new(self.epilogue))
    }
}

fn escape_quotes(name: &str) -> String {
    name.replace('"', "%22").replace(['\r', '\n'], " ")
}
