use std::{fmt, sync::Arc};

/// One input report as delivered by the kernel.
///
/// Byte 0 is the report id when the report is non-empty. Zero-length reports
/// are valid and carry no id.
#[derive(Clone, PartialEq, Eq)]
pub struct HidReport(Arc<[u8]>);

impl HidReport {
    pub fn id(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for HidReport {
    fn from(value: &[u8]) -> Self {
        Self(Arc::from(value))
    }
}

impl From<Vec<u8>> for HidReport {
    fn from(value: Vec<u8>) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Debug for HidReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HidReport[{}](", self.0.len())?;
        for (idx, byte) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        f.write_str(")")
    }
}
