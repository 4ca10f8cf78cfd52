// Preview handles
// Renderable references to image blobs, released explicitly and exactly once

use imagent::EncodedImage;
use std::collections::{HashMap, HashSet};

/// Opaque reference to a rendered preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewHandle(u64);

impl PreviewHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Host-side resource behind each handle
pub trait PreviewBackend: Send {
    fn create(&mut self, handle: PreviewHandle, image: &EncodedImage);
    fn revoke(&mut self, handle: PreviewHandle);
    /// Renderable location of a live preview, if the backend has one
    fn url(&self, handle: PreviewHandle) -> Option<&str>;
}

/// Previews rendered as `data:` URLs
#[derive(Debug, Default)]
pub struct DataUrlPreviews {
    urls: HashMap<PreviewHandle, String>,
}

impl DataUrlPreviews {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewBackend for DataUrlPreviews {
    fn create(&mut self, handle: PreviewHandle, image: &EncodedImage) {
        let url = format!("data:{};base64,{}", image.mime_type(), image.to_base64());
        self.urls.insert(handle, url);
    }

    fn revoke(&mut self, handle: PreviewHandle) {
        self.urls.remove(&handle);
    }

    fn url(&self, handle: PreviewHandle) -> Option<&str> {
        self.urls.get(&handle).map(String::as_str)
    }
}

/// Table of live handles. Every acquired handle is revoked exactly once:
/// on explicit release, or when the registry is dropped.
pub struct PreviewRegistry {
    backend: Box<dyn PreviewBackend>,
    live: HashSet<PreviewHandle>,
    next: u64,
}

impl PreviewRegistry {
    pub fn new(backend: Box<dyn PreviewBackend>) -> Self {
        Self {
            backend,
            live: HashSet::new(),
            next: 1,
        }
    }

    pub fn acquire(&mut self, image: &EncodedImage) -> PreviewHandle {
        let handle = PreviewHandle(self.next);
        self.next += 1;
        self.backend.create(handle, image);
        self.live.insert(handle);
        handle
    }

    /// Revoke a handle. Returns false if it was not live.
    pub fn release(&mut self, handle: PreviewHandle) -> bool {
        if self.live.remove(&handle) {
            self.backend.revoke(handle);
            true
        } else {
            false
        }
    }

    pub fn release_all_of(&mut self, handles: impl IntoIterator<Item = PreviewHandle>) -> usize {
        handles.into_iter().filter(|h| self.release(*h)).count()
    }

    pub fn release_all(&mut self) -> usize {
        let mut live: Vec<PreviewHandle> = self.live.iter().copied().collect();
        live.sort();
        self.release_all_of(live)
    }

    pub fn url(&self, handle: PreviewHandle) -> Option<&str> {
        if self.is_live(handle) {
            self.backend.url(handle)
        } else {
            None
        }
    }

    pub fn is_live(&self, handle: PreviewHandle) -> bool {
        self.live.contains(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl Default for PreviewRegistry {
    fn default() -> Self {
        Self::new(Box::new(DataUrlPreviews::new()))
    }
}

impl Drop for PreviewRegistry {
    fn drop(&mut self) {
        let released = self.release_all();
        if released > 0 {
            tracing::debug!("Released {} preview handles on teardown", released);
        }
    }
}
