//! Request tracing handle passed to the dispatcher and file system at
//! construction.

use crate::request::OpKind;
use tracing::Span;

/// A parent span plus a per-operation-kind mask.
///
/// Only requests whose kind bit is set are traced. The mask uses
/// [`OpKind::bit`]; `u32::MAX` traces everything and `0` nothing.
#[derive(Debug, Clone)]
pub struct DebugLog {
    span: Span,
    mask: u32,
}

impl DebugLog {
    pub fn new(span: Span, mask: u32) -> Self {
        Self { span, mask }
    }

    pub fn all(span: Span) -> Self {
        Self::new(span, u32::MAX)
    }

    pub fn disabled() -> Self {
        Self::new(Span::none(), 0)
    }

    pub fn for_kinds(span: Span, kinds: &[OpKind]) -> Self {
        let mask = kinds.iter().fold(0, |mask, kind| mask | kind.bit());
        Self::new(span, mask)
    }

    pub fn enabled(&self, kind: OpKind) -> bool {
        self.mask & kind.bit() != 0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::disabled()
    }
}
