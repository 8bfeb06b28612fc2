//! Pipeline stages for PDF-to-text conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. [`crate::convert`] drives them in order.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ materialize ──▶ describe ──▶ assemble ──▶ write
//! (path)    (pdfium)    (PNG files)     (vision)    (segments)   (.txt)
//! ```
//!
//! 1. [`input`]: check the path exists and carries the `%PDF` magic
//! 2. [`extract`]: walk each page's objects in content order, yielding text
//!    and image blocks; runs in `spawn_blocking` because pdfium is not
//!    async-safe
//! 3. [`materialize`]: write each image as `<token>.png` into the run's
//!    temporary directory and leave an image segment in its place
//! 4. [`describe`]: send each image to the local vision runtime, one at a
//!    time; the only stage with network I/O
//! 5. [`assemble`]: render segments, substituting descriptions by position
//! 6. [`write`]: atomic write of the assembled text
//!
//! [`encode`] holds the PNG and data-URI helpers shared by materialize and
//! describe.

pub mod assemble;
pub mod describe;
pub mod encode;
pub mod extract;
pub mod input;
pub mod materialize;
pub mod write;
