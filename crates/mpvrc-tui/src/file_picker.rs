//! File picker: a modal directory browser over `/file-system`.
//!
//! Listings are fetched fresh on every navigation and never cached.  The
//! picker only tracks which request it issued last, so a slow response for
//! an older navigation cannot replace a newer listing.

use tracing::debug;

use mpvrc_proto::protocol::{FileSystemEntry, FileSystemListing};

use crate::client::ClientError;
use crate::controller::Controller;

/// A request the picker wants performed.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    List { path: String, parent_of: bool },
    Load { path: String },
}

/// Result of a completed [`Navigation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Listed(FileSystemListing),
    Loaded,
}

impl Navigation {
    pub async fn run(self, controller: &Controller) -> Result<Outcome, ClientError> {
        match self {
            Navigation::List { path, parent_of } => {
                debug!("picker: listing {:?} (parent_of={})", path, parent_of);
                let listing = controller.client().list_directory(&path, parent_of).await?;
                Ok(Outcome::Listed(listing))
            }
            Navigation::Load { path } => {
                controller.load_file(&path).await?;
                Ok(Outcome::Loaded)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct FilePicker {
    open: bool,
    path: String,
    entries: Vec<FileSystemEntry>,
    cursor: usize,
    /// Sequence number of the last navigation issued.
    issued: u64,
}

impl FilePicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entries(&self) -> &[FileSystemEntry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected(&self) -> Option<&FileSystemEntry> {
        self.entries.get(self.cursor)
    }

    /// Start browsing at the directory containing `current_path` (the
    /// playing file), or at the roots when nothing is loaded.  The dialog
    /// opens once the first listing arrives.
    pub fn open(&mut self, current_path: Option<&str>) -> (u64, Navigation) {
        let nav = Navigation::List {
            path: current_path.unwrap_or_default().to_string(),
            parent_of: true,
        };
        (self.issue(), nav)
    }

    /// Act on the entry under the cursor: drill into a directory, or load a
    /// file.
    pub fn select(&mut self) -> Option<(u64, Navigation)> {
        let entry = self.selected()?;
        let nav = if entry.is_dir {
            Navigation::List {
                path: entry.path.clone(),
                parent_of: false,
            }
        } else {
            Navigation::Load {
                path: entry.path.clone(),
            }
        };
        Some((self.issue(), nav))
    }

    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Apply the outcome of navigation `seq`.  Outcomes of superseded
    /// navigations are dropped.  Returns whether anything changed.
    pub fn apply(&mut self, seq: u64, outcome: Outcome) -> bool {
        if seq != self.issued {
            debug!("picker: dropping stale outcome {} (latest {})", seq, self.issued);
            return false;
        }
        match outcome {
            Outcome::Listed(listing) => {
                self.path = listing.path;
                self.entries = listing.entries;
                self.cursor = 0;
                self.open = true;
            }
            Outcome::Loaded => self.close(),
        }
        true
    }

    pub fn close(&mut self) {
        self.open = false;
        // Any in-flight navigation is now stale.
        self.issued += 1;
    }

    pub fn up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn down(&mut self) {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn first(&mut self) {
        self.cursor = 0;
    }

    pub fn last(&mut self) {
        self.cursor = self.entries.len().saturating_sub(1);
    }
}
