use chlog_core::commits::{Commit, History};
use chlog_core::{ChangelogError, Result};
use time::OffsetDateTime;

const FIELD: char = '\x1f';
const RECORD: char = '\x1e';

/// `git log` format: id, parents, committer time, raw body.
pub const LOG_FORMAT: &str = "--format=%H%x1f%P%x1f%ct%x1f%B%x1e";

/// `git for-each-ref` format: tag name, object, peeled object (annotated tags).
pub const TAG_FORMAT: &str = "--format=%(refname:strip=2)%1f%(objectname)%1f%(*objectname)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    /// Commit the tag points at, after peeling.
    pub target: String,
}

/// Parse `git log` output produced with [`LOG_FORMAT`].
pub fn parse_log(raw: &str) -> Result<History> {
    let mut history = History::new();
    for record in raw.split(RECORD) {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, FIELD);
        let (Some(id), Some(parents), Some(time), Some(message)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ChangelogError::config(format!(
                "unexpected git log record: {:?}",
                record.chars().take(60).collect::<String>()
            )));
        };
        let bad_time = |e: &dyn std::fmt::Display| {
            ChangelogError::config(format!("bad commit time `{time}` for {id}: {e}"))
        };
        let secs: i64 = time.trim().parse().map_err(|e| bad_time(&e))?;
        let time = OffsetDateTime::from_unix_timestamp(secs).map_err(|e| bad_time(&e))?;
        history.insert(Commit {
            id: id.trim().to_string(),
            parents: parents.split_whitespace().map(str::to_string).collect(),
            time,
            message: message.to_string(),
        });
    }
    Ok(history)
}

/// Parse `git for-each-ref` output produced with [`TAG_FORMAT`].
pub fn parse_tags(raw: &str) -> Vec<TagRef> {
    raw.lines()
        .filter_map(|line| {
            let mut fields = line.split(FIELD);
            let name = fields.next()?.trim();
            let object = fields.next()?.trim();
            let peeled = fields.next().map(str::trim).unwrap_or_default();
            if name.is_empty() || object.is_empty() {
                return None;
            }
            let target = if peeled.is_empty() { object } else { peeled };
            Some(TagRef {
                name: name.to_string(),
                target: target.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, parents: &str, time: i64, message: &str) -> String {
        format!("{id}\x1f{parents}\x1f{time}\x1f{message}\x1e\n")
    }

    #[test]
    fn parses_commits_and_parents() {
        let raw = [
            record("c3", "c1 c2", 300, "Merge branch 'feature'\n"),
            record("c2", "c1", 200, "Add parser\n\nLonger body\n"),
            record("c1", "", 100, "Initial commit\n"),
        ]
        .concat();
        let h = parse_log(&raw).unwrap();
        assert_eq!(h.len(), 3);
        let merge = h.commit("c3").unwrap();
        assert_eq!(merge.parents, vec!["c1", "c2"]);
        assert_eq!(merge.time.unix_timestamp(), 300);
        assert!(h.commit("c1").unwrap().parents.is_empty());
        assert_eq!(h.commit("c2").unwrap().message, "Add parser\n\nLonger body\n");
    }

    #[test]
    fn message_may_contain_newlines_and_pipes() {
        let raw = record("a", "", 1, "fix: a | b\n\n- item\n");
        let h = parse_log(&raw).unwrap();
        assert_eq!(h.commit("a").unwrap().message, "fix: a | b\n\n- item\n");
    }

    #[test]
    fn empty_output_is_empty_history() {
        assert!(parse_log("").unwrap().is_empty());
        assert!(parse_log("\n").unwrap().is_empty());
    }

    #[test]
    fn malformed_record_is_rejected() {
        assert!(parse_log("abc\x1fdef\x1e").is_err());
        assert!(parse_log("abc\x1f\x1fnot-a-time\x1fmsg\x1e").is_err());
    }

    #[test]
    fn tags_are_peeled() {
        let raw = "v1.0\x1ftagobj\x1fcommit1\nv0.9\x1fcommit0\x1f\n\n";
        let tags = parse_tags(raw);
        assert_eq!(
            tags,
            vec![
                TagRef { name: "v1.0".into(), target: "commit1".into() },
                TagRef { name: "v0.9".into(), target: "commit0".into() },
            ]
        );
    }
}
