//! Line-oriented parser for pv_db song database files
//!
//! The format is one attribute-tagged line per field, grouped by a
//! repeated numeric identifier prefix:
//!
//! ```text
//! pv_262.song_name=ロキ
//! pv_262.song_name_en=Roki
//! pv_262.bpm=160
//! ```
//!
//! A `# <id> - <title>` comment contributes a fallback title for that
//! entry. Unrecognized lines are skipped without failing the parse, and a
//! line already bearing the suppression marker is treated as
//! already-suppressed rather than live.

use crate::error::{Error, Result};
use crate::model::{Diagnostic, DiagnosticKind, Locator, Song, Source, SourceId};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Prefix prepended to every line of a suppressed entry
///
/// The literal token is a stable contract: it keeps the line a valid
/// pv_db comment, lets a user audit what was edited, and lets re-apply
/// and restore recognize prior mutations exactly.
pub const SUPPRESS_MARKER: &str = "# [pvdb-merger] ";

/// Everything produced by parsing one source's database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Live song entries, in file order
    pub songs: Vec<Song>,
    /// Entries whose every line already bears the suppression marker
    pub suppressed: Vec<SuppressedEntry>,
    /// Non-fatal problems found while parsing
    pub diagnostics: Vec<Diagnostic>,
}

/// An entry excluded from the live set by a prior mutation, locator kept
/// so restore and idempotence logic can recognize it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressedEntry {
    pub pv_id: u32,
    pub locator: Locator,
}

#[derive(Default)]
struct EntryBuilder {
    song_name: Option<String>,
    song_name_en: Option<String>,
    comment_title: Option<String>,
    lines: Vec<usize>,
    suppressed_lines: Vec<usize>,
}

/// Parse a source's database file from disk
///
/// A file that cannot be read is fatal for this source only; the caller
/// drops the source and continues with the rest of the run.
pub fn parse_pvdb(id: SourceId, source: &Source) -> Result<ParseOutcome> {
    let content =
        std::fs::read_to_string(&source.pvdb_path).map_err(|e| Error::SourceRead {
            name: source.name.clone(),
            path: source.pvdb_path.clone(),
            source: e,
        })?;
    Ok(parse_pvdb_str(&content, id, &source.name, &source.pvdb_path))
}

/// Parse database text directly (useful for testing)
///
/// Parsing is deterministic: the same text always yields the same song
/// sequence, in file order of first appearance.
pub fn parse_pvdb_str(
    content: &str,
    id: SourceId,
    source_name: &str,
    path: &Path,
) -> ParseOutcome {
    let mut entries: HashMap<u32, EntryBuilder> = HashMap::new();
    let mut order: Vec<u32> = Vec::new();
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(SUPPRESS_MARKER) {
            // A previously suppressed line; attribute it to its entry but
            // keep it out of the live record set.
            if let Some((pv_id, _, _)) = split_pv_line(rest) {
                builder_for(&mut entries, &mut order, pv_id)
                    .suppressed_lines
                    .push(line_no);
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix('#') {
            if let Some((pv_id, title)) = split_comment_title(rest) {
                builder_for(&mut entries, &mut order, pv_id).comment_title =
                    Some(title.to_string());
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        let Some(pv_key) = strip_pv_prefix(key) else {
            continue;
        };
        let Some((id_part, attr)) = pv_key.split_once('.') else {
            diagnostics.push(malformed(source_name, path, line_no, "pv key without attribute"));
            continue;
        };
        let Ok(pv_id) = id_part.parse::<u32>() else {
            diagnostics.push(malformed(source_name, path, line_no, "unparsable pv identifier"));
            continue;
        };

        let builder = builder_for(&mut entries, &mut order, pv_id);
        builder.lines.push(line_no);
        match attr.to_ascii_lowercase().as_str() {
            "song_name" => builder.song_name = Some(value.to_string()),
            "song_name_en" => builder.song_name_en = Some(value.to_string()),
            _ => {}
        }
    }

    let mut songs = Vec::new();
    let mut suppressed = Vec::new();
    for pv_id in order {
        let builder = entries.remove(&pv_id).unwrap_or_default();
        if builder.lines.is_empty() {
            if !builder.suppressed_lines.is_empty() {
                suppressed.push(SuppressedEntry {
                    pv_id,
                    locator: Locator {
                        path: path.to_path_buf(),
                        lines: builder.suppressed_lines,
                    },
                });
            }
            // Only a comment title and nothing else: not a database entry
            continue;
        }

        let title = builder
            .song_name
            .or(builder.comment_title)
            .unwrap_or_default();
        if title.is_empty() && builder.song_name_en.is_none() {
            debug!(pv_id, source = source_name, "entry has no resolvable title");
        }
        songs.push(Song {
            pv_id,
            title,
            title_en: builder.song_name_en,
            source: id,
            locator: Locator {
                path: path.to_path_buf(),
                lines: builder.lines,
            },
        });
    }

    ParseOutcome {
        songs,
        suppressed,
        diagnostics,
    }
}

fn builder_for<'a>(
    entries: &'a mut HashMap<u32, EntryBuilder>,
    order: &mut Vec<u32>,
    pv_id: u32,
) -> &'a mut EntryBuilder {
    entries.entry(pv_id).or_insert_with(|| {
        order.push(pv_id);
        EntryBuilder::default()
    })
}

fn malformed(source: &str, path: &Path, line: usize, message: &str) -> Diagnostic {
    Diagnostic {
        kind: DiagnosticKind::MalformedEntry,
        source: source.to_string(),
        path: path.to_path_buf(),
        line: Some(line),
        message: message.to_string(),
    }
}

/// Strip the `pv_` key prefix, case-insensitively
fn strip_pv_prefix(key: &str) -> Option<&str> {
    let prefix = key.get(..3)?;
    if prefix.eq_ignore_ascii_case("pv_") {
        Some(&key[3..])
    } else {
        None
    }
}

/// Split a pv attribute line into (id, attr, value), if it is one
fn split_pv_line(line: &str) -> Option<(u32, &str, &str)> {
    let (key, value) = line.split_once('=')?;
    let pv_key = strip_pv_prefix(key.trim())?;
    let (id_part, attr) = pv_key.split_once('.')?;
    let pv_id = id_part.parse::<u32>().ok()?;
    Some((pv_id, attr, value.trim()))
}

/// Split a `<id> - <title>` comment body into (id, title), if it is one
fn split_comment_title(body: &str) -> Option<(u32, &str)> {
    let body = body.trim();
    let digits_end = body.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let pv_id = body[..digits_end].parse::<u32>().ok()?;
    let rest = body[digits_end..].trim_start();
    let title = rest.strip_prefix('-')?.trim();
    if title.is_empty() {
        return None;
    }
    Some((pv_id, title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(content: &str) -> ParseOutcome {
        parse_pvdb_str(
            content,
            SourceId(0),
            "test",
            &PathBuf::from("mod_pv_db.txt"),
        )
    }

    #[test]
    fn test_parse_grouped_entries() {
        let text = "\
pv_262.song_name=ロキ
pv_262.song_name_en=Roki
pv_262.bpm=160
pv_881.song_name=メルト
";
        let outcome = parse(text);

        assert_eq!(outcome.songs.len(), 2);
        let roki = &outcome.songs[0];
        assert_eq!(roki.pv_id, 262);
        assert_eq!(roki.title, "ロキ");
        assert_eq!(roki.title_en.as_deref(), Some("Roki"));
        assert_eq!(roki.locator.lines, vec![1, 2, 3]);

        let melt = &outcome.songs[1];
        assert_eq!(melt.pv_id, 881);
        assert_eq!(melt.title_en, None);
        assert_eq!(melt.locator.lines, vec![4]);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let text = "pv_3.song_name=C\npv_1.song_name=A\npv_2.song_name=B\n";
        let first = parse(text);
        let second = parse(text);
        assert_eq!(first, second);

        // File order of first appearance, not id order
        let ids: Vec<u32> = first.songs.iter().map(|s| s.pv_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_comment_title_is_a_fallback_only() {
        let text = "\
# 100 - Commented Name
pv_100.bpm=120
pv_200.song_name=Real Name
# 200 - Ignored Fallback
";
        let outcome = parse(text);

        assert_eq!(outcome.songs.len(), 2);
        assert_eq!(outcome.songs[0].title, "Commented Name");
        // The comment line is not part of the mutable entry span
        assert_eq!(outcome.songs[0].locator.lines, vec![2]);
        assert_eq!(outcome.songs[1].title, "Real Name");
    }

    #[test]
    fn test_comment_title_alone_is_not_an_entry() {
        let outcome = parse("# 55 - Phantom Song\n");
        assert!(outcome.songs.is_empty());
        assert!(outcome.suppressed.is_empty());
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        let text = "\
version=1
random noise
# plain comment
pv_1.song_name=Song
";
        let outcome = parse(text);
        assert_eq!(outcome.songs.len(), 1);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_entry_is_non_fatal_with_diagnostic() {
        let text = "\
pv_abc.song_name=Broken
pv_1.song_name=Fine
";
        let outcome = parse(text);
        assert_eq!(outcome.songs.len(), 1);
        assert_eq!(outcome.songs[0].pv_id, 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::MalformedEntry);
        assert_eq!(outcome.diagnostics[0].line, Some(1));
    }

    #[test]
    fn test_marked_entry_is_excluded_but_located() {
        let text = format!(
            "{m}pv_9.song_name=Gone\n{m}pv_9.song_name_en=Gone En\npv_10.song_name=Alive\n",
            m = SUPPRESS_MARKER
        );
        let outcome = parse(&text);

        assert_eq!(outcome.songs.len(), 1);
        assert_eq!(outcome.songs[0].pv_id, 10);
        assert_eq!(outcome.suppressed.len(), 1);
        assert_eq!(outcome.suppressed[0].pv_id, 9);
        assert_eq!(outcome.suppressed[0].locator.lines, vec![1, 2]);
    }

    #[test]
    fn test_partially_marked_entry_stays_live() {
        let text = format!(
            "{m}pv_5.song_name=Old Name\npv_5.song_name_en=Still Here\n",
            m = SUPPRESS_MARKER
        );
        let outcome = parse(&text);

        assert_eq!(outcome.songs.len(), 1);
        let song = &outcome.songs[0];
        assert_eq!(song.pv_id, 5);
        assert_eq!(song.title, "");
        assert_eq!(song.title_en.as_deref(), Some("Still Here"));
        // Only the live line is in the mutable span
        assert_eq!(song.locator.lines, vec![2]);
        assert!(outcome.suppressed.is_empty());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let outcome = parse("pv_7.song_name=A=B\n");
        assert_eq!(outcome.songs[0].title, "A=B");
    }

    #[test]
    fn test_key_case_is_insensitive() {
        let outcome = parse("PV_8.Song_Name=Loud\n");
        assert_eq!(outcome.songs.len(), 1);
        assert_eq!(outcome.songs[0].title, "Loud");
    }

    #[test]
    fn test_untitled_entry_survives_for_id_conflicts() {
        let outcome = parse("pv_11.bpm=175\n");
        assert_eq!(outcome.songs.len(), 1);
        assert_eq!(outcome.songs[0].matching_title(), None);
    }
}
