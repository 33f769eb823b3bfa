//! Hand-assembled single-part `multipart/form-data` bodies.
//!
//! Operates purely on byte buffers so it works in any execution environment.
//! Input bytes are framed unvalidated; the upstream checks the content.

use bytes::{BufMut, Bytes, BytesMut};

const BOUNDARY_PREFIX: &str = "----CapbridgeFormBoundary";
const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const BOUNDARY_TAIL_LEN: usize = 16;

/// Generate a fresh random boundary token for one upload.
#[must_use]
pub fn generate_boundary() -> String {
    let mut out = String::with_capacity(BOUNDARY_PREFIX.len() + BOUNDARY_TAIL_LEN);
    out.push_str(BOUNDARY_PREFIX);
    for _ in 0..BOUNDARY_TAIL_LEN {
        let idx = fastrand::usize(..ALNUM.len());
        out.push(char::from(ALNUM[idx]));
    }
    out
}

/// Frame `file` as a single `files` form part suitable for direct
/// transmission as an HTTP body.
#[must_use]
pub fn encode_multipart(file: &[u8], filename: &str, boundary: &str) -> Bytes {
    let mut body =
        BytesMut::with_capacity(file.len() + 2 * boundary.len() + filename.len() + 128);

    body.put_slice(b"--");
    body.put_slice(boundary.as_bytes());
    body.put_slice(b"\r\n");
    body.put_slice(b"Content-Disposition: form-data; name=\"files\"; filename=\"");
    body.put_slice(filename.as_bytes());
    body.put_slice(b"\"\r\n");
    body.put_slice(b"Content-Type: image/png\r\n\r\n");
    body.put_slice(file);
    body.put_slice(b"\r\n--");
    body.put_slice(boundary.as_bytes());
    body.put_slice(b"--\r\n");

    body.freeze()
}
