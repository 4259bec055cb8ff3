//! Native variable buffers.

use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, NativeContext, Result};
use crate::native::{Native, NativeData, NativeError, VarHandle, VarSpec};

/// One native variable: a fixed number of typed slots.
///
/// The buffer owns the variable and releases it exactly once, either
/// through [`VarBuffer::release`] or on drop.
pub struct VarBuffer {
    native: Arc<dyn Native>,
    handle: Option<VarHandle>,
    spec: VarSpec,
}

impl VarBuffer {
    /// Allocate a variable with `spec.max_array_size` slots.
    pub fn new(native: &Arc<dyn Native>, spec: VarSpec) -> Result<Self> {
        let handle = native.var_new(spec).context(|| {
            format!(
                "allocate {} variable of {} slots",
                spec.oracle_type, spec.max_array_size
            )
        })?;
        Ok(Self {
            native: Arc::clone(native),
            handle: Some(handle),
            spec,
        })
    }

    /// Native handle, `None` once released.
    pub fn handle(&self) -> Option<VarHandle> {
        self.handle
    }

    pub fn spec(&self) -> &VarSpec {
        &self.spec
    }

    /// Number of slots.
    pub fn len(&self) -> u32 {
        self.spec.max_array_size
    }

    pub fn is_empty(&self) -> bool {
        self.spec.max_array_size == 0
    }

    fn live(&self) -> Result<VarHandle> {
        self.handle.ok_or_else(|| {
            Error::native(
                NativeError::new(0, "DPI-1002: variable already released"),
                "access variable",
            )
        })
    }

    /// Write `data` into the 0-based `slot`.
    pub fn set(&self, slot: u32, data: NativeData) -> Result<()> {
        let handle = self.live()?;
        self.native
            .var_set(handle, slot, data)
            .context(|| format!("set slot {} of {}", slot, handle))
    }

    /// Read the 0-based `slot`.
    pub fn get(&self, slot: u32) -> Result<NativeData> {
        let handle = self.live()?;
        self.native
            .var_get(handle, slot)
            .context(|| format!("read slot {} of {}", slot, handle))
    }

    /// Number of elements of a PL/SQL array variable.
    pub fn set_num_elements(&self, num: u32) -> Result<()> {
        let handle = self.live()?;
        self.native
            .var_set_num_elements(handle, num)
            .context(|| format!("set {} elements of {}", num, handle))
    }

    /// Release the variable. Later calls are no-ops.
    pub fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self
                .native
                .var_release(handle)
                .context(|| format!("release {}", handle)),
            None => Ok(()),
        }
    }
}

impl Drop for VarBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release variable");
        }
    }
}

impl std::fmt::Debug for VarBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarBuffer")
            .field("handle", &self.handle)
            .field("spec", &self.spec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::memory::MemoryNative;
    use crate::native::{NativeTypeNum, OracleTypeNum};

    fn spec(slots: u32) -> VarSpec {
        VarSpec {
            oracle_type: OracleTypeNum::Number,
            native_type: NativeTypeNum::Int64,
            max_array_size: slots,
            size: 0,
            is_array: false,
        }
    }

    #[test]
    fn test_set_get_and_release_once() {
        let mem = Arc::new(MemoryNative::new());
        let native: Arc<dyn Native> = mem.clone();
        let mut buf = VarBuffer::new(&native, spec(3)).unwrap();
        assert_eq!(buf.len(), 3);
        buf.set(2, NativeData::Int64(9)).unwrap();
        assert_eq!(buf.get(2).unwrap(), NativeData::Int64(9));
        assert_eq!(mem.live_vars(), 1);

        buf.release().unwrap();
        buf.release().unwrap();
        assert_eq!(mem.live_vars(), 0);
        assert!(buf.set(0, NativeData::Int64(1)).is_err());
        drop(buf);
        assert_eq!(mem.live_vars(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let mem = Arc::new(MemoryNative::new());
        let native: Arc<dyn Native> = mem.clone();
        {
            let _buf = VarBuffer::new(&native, spec(1)).unwrap();
            assert_eq!(mem.live_vars(), 1);
        }
        assert_eq!(mem.live_vars(), 0);
    }

    #[test]
    fn test_out_of_range_slot() {
        let native: Arc<dyn Native> = Arc::new(MemoryNative::new());
        let buf = VarBuffer::new(&native, spec(1)).unwrap();
        let err = buf.set(1, NativeData::Int64(1)).unwrap_err();
        assert!(err.to_string().contains("set slot 1"));
    }
}
