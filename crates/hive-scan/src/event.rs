use hive_types::{EntryKind, HiveResult, ManifestKey, ObjectId};

/// What the visitor wants the scanner to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanControl {
    /// Keep going; descend into the current tree or referenced root.
    Continue,
    /// Do not descend below the current event. Only meaningful for
    /// `Tree` and `ManifestRef` events; elsewhere it equals `Continue`.
    SkipChildren,
}

/// One observation during a scan.
///
/// `path` is the slash-joined entry path relative to the scan root; the
/// root tree itself has the empty path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanEvent<'a> {
    /// A blob entry whose object is present.
    Blob { path: &'a str, id: ObjectId },
    /// A tree about to be descended into (control decides).
    Tree { path: &'a str, id: ObjectId },
    /// A manifest-reference entry. `root` carries the referenced
    /// manifest's root tree if the reference resolves in the registry.
    ManifestRef {
        path: &'a str,
        id: ObjectId,
        key: &'a ManifestKey,
        root: Option<ObjectId>,
    },
    /// An object expected but absent.
    Missing {
        path: &'a str,
        id: ObjectId,
        kind: EntryKind,
    },
    /// An object present but undecodable or failing verification.
    Damaged {
        path: &'a str,
        id: ObjectId,
        reason: &'a str,
    },
    /// An entry below the depth limit, not visited.
    Skipped {
        path: &'a str,
        id: ObjectId,
        kind: EntryKind,
    },
}

impl ScanEvent<'_> {
    /// The entry path the event refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::Blob { path, .. }
            | Self::Tree { path, .. }
            | Self::ManifestRef { path, .. }
            | Self::Missing { path, .. }
            | Self::Damaged { path, .. }
            | Self::Skipped { path, .. } => path,
        }
    }
}

/// Typed callback for scan events.
///
/// Implemented for any `FnMut(ScanEvent) -> HiveResult<ScanControl>`
/// closure; implement the trait directly when the visitor carries state
/// worth naming.
pub trait TreeVisitor {
    fn visit(&mut self, event: ScanEvent<'_>) -> HiveResult<ScanControl>;
}

impl<F> TreeVisitor for F
where
    F: FnMut(ScanEvent<'_>) -> HiveResult<ScanControl>,
{
    fn visit(&mut self, event: ScanEvent<'_>) -> HiveResult<ScanControl> {
        self(event)
    }
}
