/// The set of versions in which a quad or a named graph exists.
///
/// Versions are stored as a flat list of alternating start/end bounds. The last bound of an
/// odd-length list is an open start. Transactions write with ids above every committed version,
/// so a pending write is invisible to all snapshots until [`VersionRange::upgrade_transaction`]
/// rewrites the id into the committed version.
#[derive(Debug, Default, Eq, PartialEq, Clone)]
pub(super) enum VersionRange {
    #[default]
    Empty,
    Start(usize),
    StartEnd(usize, usize),
    Bigger(Box<[usize]>),
}

impl VersionRange {
    pub(super) fn contains(&self, version: usize) -> bool {
        match self {
            VersionRange::Empty => false,
            VersionRange::Start(start) => *start <= version,
            VersionRange::StartEnd(start, end) => *start <= version && version < *end,
            VersionRange::Bigger(bounds) => bounds.chunks(2).any(|bound| match bound {
                [start, end] => *start <= version && version < *end,
                [start] => *start <= version,
                _ => false,
            }),
        }
    }

    /// Opens the range at `version`. Returns `false` if it is already open.
    pub(super) fn add(&mut self, version: usize) -> bool {
        match self {
            VersionRange::Empty => {
                *self = VersionRange::Start(version);
                true
            }
            VersionRange::Start(_) => false,
            VersionRange::StartEnd(start, end) => {
                *self = if version == *end {
                    VersionRange::Start(*start)
                } else {
                    VersionRange::Bigger(Box::new([*start, *end, version]))
                };
                true
            }
            VersionRange::Bigger(bounds) => {
                if bounds.len() % 2 != 0 {
                    return false;
                }
                *self = VersionRange::Bigger(if bounds.ends_with(&[version]) {
                    without_last(bounds)
                } else {
                    with_pushed(bounds, version)
                });
                true
            }
        }
    }

    /// Closes the range at `version`. Returns `false` if it is not open.
    pub(super) fn remove(&mut self, version: usize) -> bool {
        match self {
            VersionRange::Empty | VersionRange::StartEnd(_, _) => false,
            VersionRange::Start(start) => {
                *self = if *start == version {
                    VersionRange::Empty
                } else {
                    VersionRange::StartEnd(*start, version)
                };
                true
            }
            VersionRange::Bigger(bounds) => {
                if bounds.len() % 2 == 0 {
                    return false;
                }
                *self = if bounds.ends_with(&[version]) {
                    Self::without_last_bound(bounds)
                } else {
                    VersionRange::Bigger(with_pushed(bounds, version))
                };
                true
            }
        }
    }

    pub(super) fn upgrade_transaction(&mut self, transaction_id: usize, version_id: usize) {
        match self {
            VersionRange::Empty => (),
            VersionRange::Start(start) => {
                if *start == transaction_id {
                    *start = version_id;
                }
            }
            VersionRange::StartEnd(_, end) => {
                if *end == transaction_id {
                    *end = version_id;
                }
            }
            VersionRange::Bigger(bounds) => {
                if let Some(last) = bounds.last_mut() {
                    if *last == transaction_id {
                        *last = version_id;
                    }
                }
            }
        }
    }

    pub(super) fn rollback_transaction(&mut self, transaction_id: usize) {
        match self {
            VersionRange::Empty => (),
            VersionRange::Start(start) => {
                if *start == transaction_id {
                    *self = VersionRange::Empty;
                }
            }
            VersionRange::StartEnd(start, end) => {
                if *end == transaction_id {
                    *self = VersionRange::Start(*start);
                }
            }
            VersionRange::Bigger(bounds) => {
                if bounds.ends_with(&[transaction_id]) {
                    *self = Self::without_last_bound(bounds);
                }
            }
        }
    }

    fn without_last_bound(bounds: &[usize]) -> Self {
        match bounds {
            [start, end, _] => VersionRange::StartEnd(*start, *end),
            _ => VersionRange::Bigger(without_last(bounds)),
        }
    }
}

fn with_pushed(bounds: &[usize], bound: usize) -> Box<[usize]> {
    let mut out = Vec::with_capacity(bounds.len() + 1);
    out.extend_from_slice(bounds);
    out.push(bound);
    out.into_boxed_slice()
}

fn without_last(bounds: &[usize]) -> Box<[usize]> {
    bounds[..bounds.len().saturating_sub(1)].into()
}
