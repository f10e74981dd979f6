//! Pull-based stage chain: one source stream, any number of transforms,
//! one renderer draining the end.

use crate::error::{ChangelogError, Result};
use crate::model::SourceRecord;

pub type RecordStream = Box<dyn Iterator<Item = Result<SourceRecord>>>;

/// Terminal consumer. Draining the records materializes output.
pub trait Renderer {
    fn render(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()>;
}

/// A transform stage. Receives its upstream exactly once.
pub trait Stage {
    fn name(&self) -> &str;
    fn apply(self: Box<Self>, upstream: RecordStream) -> RecordStream;
}

/// Stop pulling after `n` records.
pub struct Limit(pub usize);

impl Stage for Limit {
    fn name(&self) -> &str {
        "limit"
    }

    fn apply(self: Box<Self>, upstream: RecordStream) -> RecordStream {
        Box::new(upstream.take(self.0))
    }
}

/// Drop records whose releases carry no items.
pub struct SkipEmpty;

impl Stage for SkipEmpty {
    fn name(&self) -> &str {
        "skip-empty"
    }

    fn apply(self: Box<Self>, upstream: RecordStream) -> RecordStream {
        Box::new(upstream.filter(|r| !matches!(r, Ok(rec) if rec.items.is_empty())))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rendered: usize,
    pub skipped: usize,
}

pub struct Pipeline {
    source: RecordStream,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(source: RecordStream) -> Self {
        Self {
            source,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Thread the source through every stage, in order.
    pub fn into_stream(self) -> RecordStream {
        self.stages.into_iter().fold(self.source, |upstream, stage| {
            tracing::trace!(stage = stage.name(), "attaching stage");
            stage.apply(upstream)
        })
    }

    /// Drain the chain into `renderer`. Per-record errors are logged and the
    /// record skipped; any other error stops the stream and is returned once
    /// the renderer has finished.
    pub fn run(self, renderer: &mut dyn Renderer) -> Result<RunSummary> {
        let mut drain = Drain {
            stream: self.into_stream(),
            fatal: None,
            summary: RunSummary::default(),
        };
        renderer.render(&mut drain)?;
        match drain.fatal {
            Some(e) => Err(e),
            None => Ok(drain.summary),
        }
    }
}

struct Drain {
    stream: RecordStream,
    fatal: Option<ChangelogError>,
    summary: RunSummary,
}

impl Iterator for Drain {
    type Item = SourceRecord;

    fn next(&mut self) -> Option<SourceRecord> {
        if self.fatal.is_some() {
            return None;
        }
        loop {
            match self.stream.next()? {
                Ok(record) => {
                    self.summary.rendered += 1;
                    return Some(record);
                }
                Err(e) if e.is_per_record() => {
                    tracing::warn!(error = %e, "skipping release");
                    self.summary.skipped += 1;
                }
                Err(e) => {
                    self.fatal = Some(e);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AggregatedChangelog, Bound, ChangeItem, CommitChange, ReleaseBody, ReleaseRange,
        VersionMarker,
    };
    use crate::source::{ChangelogSource, Selection, SourceStage};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use time::OffsetDateTime;

    struct Scripted {
        markers: Vec<VersionMarker>,
        reads: Rc<Cell<usize>>,
        fail_on: Option<String>,
        empty_on: Option<String>,
    }

    impl Scripted {
        fn new(names: &[&str], reads: Rc<Cell<usize>>) -> Self {
            let markers = names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    let at = OffsetDateTime::from_unix_timestamp(i as i64 * 100).unwrap();
                    VersionMarker::new(*n, at, *n)
                })
                .collect();
            Self {
                markers,
                reads,
                fail_on: None,
                empty_on: None,
            }
        }
    }

    impl ChangelogSource for Scripted {
        fn kind(&self) -> &str {
            "scripted"
        }

        fn versions(&mut self) -> Result<Vec<VersionMarker>> {
            Ok(self.markers.clone())
        }

        fn changes_since(&mut self, range: &ReleaseRange) -> Result<AggregatedChangelog> {
            self.reads.set(self.reads.get() + 1);
            let reference = match &range.upper {
                Bound::Marker(m) => m.reference.clone(),
                _ => "HEAD".into(),
            };
            if self.fail_on.as_deref() == Some(range.release_name.as_str()) {
                return Err(ChangelogError::RangeResolution {
                    release: range.release_name.clone(),
                    reference,
                });
            }
            let items = if self.empty_on.as_deref() == Some(range.release_name.as_str()) {
                Vec::new()
            } else {
                vec![ChangeItem::Commit(CommitChange {
                    id: reference.clone(),
                    message: format!("work for {}", range.release_name),
                    timestamp: OffsetDateTime::UNIX_EPOCH,
                })]
            };
            Ok(AggregatedChangelog::single(&range.release_name, ReleaseBody::Flat(items)))
        }
    }

    #[derive(Default)]
    struct Collect(Rc<RefCell<Vec<String>>>);

    impl Renderer for Collect {
        fn render(&mut self, records: &mut dyn Iterator<Item = SourceRecord>) -> Result<()> {
            for r in records {
                for (name, _) in r.items.releases {
                    self.0.borrow_mut().push(name);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn renders_newest_first() {
        let reads = Rc::new(Cell::new(0));
        let stream = SourceStage::new(Box::new(Scripted::new(&["v1", "v2"], reads)))
            .open()
            .unwrap();
        let mut out = Collect::default();
        let summary = Pipeline::new(stream).run(&mut out).unwrap();
        assert_eq!(*out.0.borrow(), vec!["Development", "v2", "v1"]);
        assert_eq!(summary, RunSummary { rendered: 3, skipped: 0 });
    }

    #[test]
    fn limit_stops_pulling_upstream() {
        let reads = Rc::new(Cell::new(0));
        let stream = SourceStage::new(Box::new(Scripted::new(&["v1", "v2", "v3"], reads.clone())))
            .include_unreleased(false)
            .open()
            .unwrap();
        let mut out = Collect::default();
        Pipeline::new(stream).stage(Limit(1)).run(&mut out).unwrap();
        assert_eq!(*out.0.borrow(), vec!["v3"]);
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn opening_reads_nothing() {
        let reads = Rc::new(Cell::new(0));
        let _stream = SourceStage::new(Box::new(Scripted::new(&["v1"], reads.clone())))
            .open()
            .unwrap();
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn range_errors_cost_one_release() {
        let reads = Rc::new(Cell::new(0));
        let mut src = Scripted::new(&["v1", "v2", "v3"], reads);
        src.fail_on = Some("v2".into());
        let stream = SourceStage::new(Box::new(src)).include_unreleased(false).open().unwrap();
        let mut out = Collect::default();
        let summary = Pipeline::new(stream).run(&mut out).unwrap();
        assert_eq!(*out.0.borrow(), vec!["v3", "v1"]);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn fatal_errors_stop_the_run() {
        let failing: RecordStream = Box::new(
            vec![
                Ok(SourceRecord {
                    items: AggregatedChangelog::default(),
                    source_kind: "x".into(),
                }),
                Err(ChangelogError::config("boom")),
                Ok(SourceRecord {
                    items: AggregatedChangelog::default(),
                    source_kind: "x".into(),
                }),
            ]
            .into_iter(),
        );
        let mut out = Collect::default();
        let err = Pipeline::new(failing).run(&mut out).unwrap_err();
        assert!(matches!(err, ChangelogError::Configuration(_)));
    }

    #[test]
    fn skip_empty_drops_blank_releases() {
        let reads = Rc::new(Cell::new(0));
        let mut src = Scripted::new(&["v1", "v2"], reads);
        src.empty_on = Some("v2".into());
        let stream = SourceStage::new(Box::new(src)).include_unreleased(false).open().unwrap();
        let mut out = Collect::default();
        Pipeline::new(stream).stage(SkipEmpty).run(&mut out).unwrap();
        assert_eq!(*out.0.borrow(), vec!["v1"]);
    }

    #[test]
    fn single_selection_and_unknown_version() {
        let reads = Rc::new(Cell::new(0));
        let stream = SourceStage::new(Box::new(Scripted::new(&["v1", "v2"], reads.clone())))
            .selection(Selection::Single("v1".into()))
            .open()
            .unwrap();
        let mut out = Collect::default();
        Pipeline::new(stream).run(&mut out).unwrap();
        assert_eq!(*out.0.borrow(), vec!["v1"]);

        let err = SourceStage::new(Box::new(Scripted::new(&["v1"], reads.clone())))
            .selection(Selection::Single("v7".into()))
            .open()
            .err()
            .unwrap();
        assert!(matches!(err, ChangelogError::Configuration(_)));
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn unreleased_can_be_selected_by_name() {
        let reads = Rc::new(Cell::new(0));
        let stream = SourceStage::new(Box::new(Scripted::new(&["v1"], reads)))
            .include_unreleased(false)
            .selection(Selection::Single("Development".into()))
            .open()
            .unwrap();
        let mut out = Collect::default();
        Pipeline::new(stream).run(&mut out).unwrap();
        assert_eq!(*out.0.borrow(), vec!["Development"]);
    }

    #[test]
    fn colliding_release_names_fail_before_reading() {
        let reads = Rc::new(Cell::new(0));
        let err = SourceStage::new(Box::new(Scripted::new(&["v1", "Development"], reads.clone())))
            .open()
            .err()
            .unwrap();
        assert!(matches!(err, ChangelogError::Configuration(_)));

        let err = SourceStage::new(Box::new(Scripted::new(&["1.0", "1.0"], reads.clone())))
            .include_unreleased(false)
            .selection(Selection::Single("1.0".into()))
            .open()
            .err()
            .unwrap();
        assert!(matches!(err, ChangelogError::Configuration(_)));
        assert_eq!(reads.get(), 0);
    }
}
