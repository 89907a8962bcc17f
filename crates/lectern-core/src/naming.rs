//! Filename and time-label helpers shared by the catalog and the API.

use std::cmp::Ordering;

use sha2::{Digest, Sha256};

/// Extensions accepted as lecture audio, compared case-insensitively.
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".m4a", ".flac", ".ogg"];

pub fn is_audio_file(filename: &str) -> bool {
  let lower = filename.to_lowercase();
  AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// SHA-256 hex digest of a filename; used to detect re-imports of the same
/// file within a topic.
pub fn file_hash(filename: &str) -> String {
  hex::encode(Sha256::digest(filename.as_bytes()))
}

/// Lecture title derived from a filename: the stem, trimmed. Falls back to
/// the full filename when the stem is blank.
pub fn title_from_filename(filename: &str) -> String {
  let stem = match filename.rfind('.') {
    Some(idx) if idx > 0 => &filename[..idx],
    _ => filename,
  };
  let stem = stem.trim();
  if stem.is_empty() { filename.to_owned() } else { stem.to_owned() }
}

// ─── Natural ordering ────────────────────────────────────────────────────────

/// Alternating text/number runs. Index 0 is always text (possibly empty), so
/// runs at equal indices always have the same kind.
fn runs(s: &str) -> Vec<&str> {
  let mut out = Vec::new();
  let mut start = 0;
  let mut in_digits = false;
  for (idx, ch) in s.char_indices() {
    let digit = ch.is_ascii_digit();
    if digit != in_digits {
      out.push(&s[start..idx]);
      start = idx;
      in_digits = digit;
    }
  }
  out.push(&s[start..]);
  out
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
  let a = a.trim_start_matches('0');
  let b = b.trim_start_matches('0');
  a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two names so that embedded numbers sort by value
/// (`"part 2"` before `"part 10"`) and text sorts case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
  let (ra, rb) = (runs(a), runs(b));
  for (idx, (x, y)) in ra.iter().zip(rb.iter()).enumerate() {
    let ord = if idx % 2 == 1 {
      cmp_numeric(x, y)
    } else {
      x.to_lowercase().cmp(&y.to_lowercase())
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
  ra.len().cmp(&rb.len())
}

// ─── Time labels ─────────────────────────────────────────────────────────────

/// `M:SS` for a position in seconds. Negative input renders as `0:00`.
pub fn format_timestamp(seconds: f64) -> String {
  let total = seconds.max(0.0).floor() as u64;
  format!("{}:{:02}", total / 60, total % 60)
}

/// Like [`format_timestamp`], but unknown or zero lengths render as `--:--`.
pub fn format_seconds(seconds: Option<f64>) -> String {
  match seconds {
    Some(s) if s > 0.0 => format_timestamp(s),
    _ => "--:--".to_owned(),
  }
}
