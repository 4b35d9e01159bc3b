//! Read-only access to named shared-memory regions.
//!
//! The OS provider opens Windows file mappings without creating them, so a
//! missing region means the title is not running. [`InMemoryRegions`] backs
//! the same interface with process-local buffers for tests and replay tools.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// Copies attempted before a read is reported as torn.
pub const STABLE_READ_ATTEMPTS: usize = 3;

/// A mapped region written by another process.
pub trait SharedRegion: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `len` bytes at `offset`. `None` once the region is gone or the
    /// range is outside the mapping.
    fn read_bytes(&self, offset: usize, len: usize) -> Option<Vec<u8>>;

    fn snapshot(&self) -> Option<Vec<u8>> {
        self.read_bytes(0, self.len())
    }
}

/// Opens regions by name.
pub trait RegionProvider: Send + Sync + fmt::Debug {
    /// Open the first of `names` that exists, mapping at least `size` bytes.
    fn open(&self, names: &[&str], size: usize) -> Option<Arc<dyn SharedRegion>>;
}

/// Outcome of a consistency-checked copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StableRead {
    Stable(Vec<u8>),
    /// The writer updated the region during every attempt.
    Torn,
    Gone,
}

/// Copy a region and confirm the update key at `key_offset` did not change
/// while copying. Retries up to [`STABLE_READ_ATTEMPTS`] times.
pub fn read_stable(region: &dyn SharedRegion, key_offset: usize, key_len: usize) -> StableRead {
    for _ in 0..STABLE_READ_ATTEMPTS {
        let Some(copy) = region.snapshot() else {
            return StableRead::Gone;
        };
        let Some(key_after) = region.read_bytes(key_offset, key_len) else {
            return StableRead::Gone;
        };
        let key_before = key_offset
            .checked_add(key_len)
            .and_then(|end| copy.get(key_offset..end));
        if key_before == Some(key_after.as_slice()) {
            return StableRead::Stable(copy);
        }
        trace!(region = region.name(), "update key changed mid-copy, retrying");
    }
    StableRead::Torn
}

/// Operating-system shared memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRegionProvider;

impl RegionProvider for OsRegionProvider {
    #[cfg(windows)]
    fn open(&self, names: &[&str], size: usize) -> Option<Arc<dyn SharedRegion>> {
        os::open_first(names, size).map(|region| Arc::new(region) as Arc<dyn SharedRegion>)
    }

    #[cfg(not(windows))]
    fn open(&self, names: &[&str], _size: usize) -> Option<Arc<dyn SharedRegion>> {
        trace!(?names, "named shared memory is only available on Windows");
        None
    }
}

#[cfg(windows)]
#[expect(unsafe_code, reason = "Win32 file mapping FFI")]
mod os {
    use super::SharedRegion;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use tracing::debug;
    use winapi::um::{
        handleapi::CloseHandle,
        memoryapi::{FILE_MAP_READ, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile},
        winnt::HANDLE,
    };

    #[derive(Debug)]
    pub struct WindowsRegion {
        name: String,
        handle: HANDLE,
        base_ptr: *const u8,
        size: usize,
    }

    // SAFETY: the view is mapped read-only and only ever copied out of; the
    // handle is owned exclusively and released once in Drop.
    unsafe impl Send for WindowsRegion {}
    // SAFETY: see above; no interior mutation happens through &self.
    unsafe impl Sync for WindowsRegion {}

    fn to_wide_null_terminated(value: &str) -> Vec<u16> {
        OsStr::new(value)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    pub fn open_first(names: &[&str], size: usize) -> Option<WindowsRegion> {
        for name in names {
            let wide_name = to_wide_null_terminated(name);
            // SAFETY: wide_name is null-terminated and lives for the duration of the call.
            let handle = unsafe { OpenFileMappingW(FILE_MAP_READ, 0, wide_name.as_ptr()) };
            if handle.is_null() {
                continue;
            }

            // SAFETY: handle is a valid file-mapping handle opened above.
            let base_ptr = unsafe { MapViewOfFile(handle, FILE_MAP_READ, 0, 0, size) } as *const u8;
            if base_ptr.is_null() {
                // SAFETY: handle is valid and not used after this point.
                unsafe { CloseHandle(handle) };
                debug!(region = %name, size, "mapping exists but view could not be mapped");
                continue;
            }

            return Some(WindowsRegion {
                name: (*name).to_string(),
                handle,
                base_ptr,
                size,
            });
        }
        None
    }

    impl SharedRegion for WindowsRegion {
        fn name(&self) -> &str {
            &self.name
        }

        fn len(&self) -> usize {
            self.size
        }

        fn read_bytes(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
            let end = offset.checked_add(len)?;
            if end > self.size {
                return None;
            }
            let mut out = vec![0u8; len];
            // SAFETY: offset..end lies within the mapped view of `size` bytes,
            // and `out` is a distinct allocation of `len` bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(self.base_ptr.add(offset), out.as_mut_ptr(), len);
            }
            Some(out)
        }
    }

    impl Drop for WindowsRegion {
        fn drop(&mut self) {
            // SAFETY: base_ptr and handle came from MapViewOfFile/OpenFileMappingW
            // and are released exactly once here.
            unsafe {
                UnmapViewOfFile(self.base_ptr as *const _);
                CloseHandle(self.handle);
            }
        }
    }
}

/// A process-local region. Writers update it through [`InMemoryRegion::write`].
#[derive(Debug)]
pub struct InMemoryRegion {
    name: String,
    data: RwLock<Vec<u8>>,
    closed: AtomicBool,
}

impl InMemoryRegion {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(vec![0u8; size]),
            closed: AtomicBool::new(false),
        }
    }

    /// Overwrite bytes starting at `offset`. Bytes past the end are dropped.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.write();
        if let Some(target) = data.get_mut(offset..) {
            let n = target.len().min(bytes.len());
            if let (Some(dst), Some(src)) = (target.get_mut(..n), bytes.get(..n)) {
                dst.copy_from_slice(src);
            }
        }
    }

    /// Replace the whole contents, keeping the region size.
    pub fn replace(&self, bytes: &[u8]) {
        self.write(0, bytes);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl SharedRegion for InMemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }

    fn read_bytes(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        if self.is_closed() {
            return None;
        }
        let data = self.data.read();
        let end = offset.checked_add(len)?;
        data.get(offset..end).map(<[u8]>::to_vec)
    }
}

/// Named in-memory regions, shared between a simulated writer and readers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRegions {
    regions: Arc<RwLock<HashMap<String, Arc<InMemoryRegion>>>>,
}

impl InMemoryRegions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a region and return the writer handle.
    pub fn create(&self, name: &str, size: usize) -> Arc<InMemoryRegion> {
        let region = Arc::new(InMemoryRegion::new(name, size));
        if let Some(previous) = self
            .regions
            .write()
            .insert(name.to_string(), Arc::clone(&region))
        {
            previous.close();
        }
        region
    }

    /// Remove a region. Readers holding it observe it as gone.
    pub fn remove(&self, name: &str) {
        if let Some(region) = self.regions.write().remove(name) {
            region.close();
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<InMemoryRegion>> {
        self.regions.read().get(name).cloned()
    }
}

impl RegionProvider for InMemoryRegions {
    fn open(&self, names: &[&str], size: usize) -> Option<Arc<dyn SharedRegion>> {
        let regions = self.regions.read();
        names
            .iter()
            .filter_map(|name| regions.get(*name))
            .find(|region| region.len() >= size)
            .map(|region| Arc::clone(region) as Arc<dyn SharedRegion>)
    }
}
