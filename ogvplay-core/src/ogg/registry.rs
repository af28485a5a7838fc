// STREAM REGISTRY - routes pages to logical streams by serial number
//
// During the header phase every stream that opened with a BOS page is held,
// since the wanted codec cannot be identified from a single page. Once one
// stream is selected the rest are torn down and their later pages ignored.

use std::collections::HashSet;

use super::{LogicalStream, OggError, Page};

/// What happened to a routed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// First page of a new logical stream
    Opened,
    /// Appended to a held or selected stream
    Appended,
    /// Belongs to a discarded or unknown stream
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub serial: u32,
    pub bos: bool,
    pub disposition: Disposition,
}

#[derive(Debug, Default)]
pub struct StreamRegistry {
    /// Streams awaiting classification, in opening order
    held: Vec<LogicalStream>,
    selected: Option<LogicalStream>,
    discarded: HashSet<u32>,
    ignored_pages: u64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, page: Page) -> Result<Routed, OggError> {
        let serial = page.serial();
        let bos = page.is_bos();

        let disposition = if let Some(stream) = self
            .selected
            .as_mut()
            .filter(|s| s.serial() == serial)
        {
            stream.page_in(&page)?;
            Disposition::Appended
        } else if self.discarded.contains(&serial) {
            Disposition::Ignored
        } else if let Some(stream) = self.held.iter_mut().find(|s| s.serial() == serial) {
            stream.page_in(&page)?;
            Disposition::Appended
        } else if bos && self.selected.is_none() {
            let mut stream = LogicalStream::new(serial);
            stream.page_in(&page)?;
            tracing::debug!("Opened logical stream {:#010x}", serial);
            self.held.push(stream);
            Disposition::Opened
        } else {
            if bos {
                // Opened after classification: nothing will consume it
                self.discarded.insert(serial);
            }
            Disposition::Ignored
        };

        if disposition == Disposition::Ignored {
            self.ignored_pages += 1;
            tracing::trace!("Ignored page for stream {:#010x}", serial);
        }

        Ok(Routed {
            serial,
            bos,
            disposition,
        })
    }

    /// Promote a held stream to the decoded stream and tear down the others.
    ///
    /// Returns `false` if no held stream has that serial.
    pub fn promote(&mut self, serial: u32) -> bool {
        let Some(idx) = self.held.iter().position(|s| s.serial() == serial) else {
            return false;
        };
        let stream = self.held.remove(idx);
        for other in self.held.drain(..) {
            tracing::debug!("Tearing down stream {:#010x}", other.serial());
            self.discarded.insert(other.serial());
        }
        self.selected = Some(stream);
        true
    }

    pub fn held(&self) -> impl Iterator<Item = &LogicalStream> {
        self.held.iter()
    }

    pub fn held_mut(&mut self, serial: u32) -> Option<&mut LogicalStream> {
        self.held.iter_mut().find(|s| s.serial() == serial)
    }

    pub fn held_serials(&self) -> Vec<u32> {
        self.held.iter().map(|s| s.serial()).collect()
    }

    pub fn selected(&self) -> Option<&LogicalStream> {
        self.selected.as_ref()
    }

    pub fn selected_mut(&mut self) -> Option<&mut LogicalStream> {
        self.selected.as_mut()
    }

    pub fn is_discarded(&self, serial: u32) -> bool {
        self.discarded.contains(&serial)
    }

    pub fn ignored_pages(&self) -> u64 {
        self.ignored_pages
    }
}
