//! Data-grid detection from the persisted domain configuration
//!
//! Looks for a non-empty `coherence-cluster-system-resource` element in
//! `config/config.xml`. Anything that cannot be read or parsed counts as
//! a grid being present, so the slower drain-first path is taken.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const ELEMENT: &[u8] = b"coherence-cluster-system-resource";

/// Deployment topology, decided once per run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterTopology {
    pub has_distributed_data_grid: bool,
}

impl ClusterTopology {
    /// Inspect `<domain_home>/config/config.xml`.
    pub fn from_domain_home(domain_home: &Path) -> Self {
        Self {
            has_distributed_data_grid: detect_file(&domain_home.join("config").join("config.xml")),
        }
    }
}

/// Read and inspect a configuration file. Unreadable → `true`.
pub fn detect_file(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(text) => detect(&text),
        Err(e) => {
            log::warn!(
                "Cannot read {}: {e}; assuming a data grid is present",
                path.display()
            );
            true
        }
    }
}

/// Whether the configuration text declares a non-empty data-grid resource.
///
/// Malformed input → `true`.
pub fn detect(config: &str) -> bool {
    match scan(config) {
        Ok(found) => found,
        Err(e) => {
            log::warn!("Cannot parse domain configuration: {e}; assuming a data grid is present");
            true
        }
    }
}

/// Walk the document; `Ok(true)` once a grid element with content is seen.
///
/// Inside the grid element anything but whitespace is content: child
/// elements, text, CDATA, comments and processing instructions. Attributes
/// on the grid element itself count too.
fn scan(config: &str) -> Result<bool, String> {
    let mut reader = Reader::from_str(config);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    // Depth at which the grid element was opened, while inside one
    let mut open_at: Option<usize> = None;
    let mut found = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                depth += 1;
                match open_at {
                    Some(_) => found = true,
                    None if is_grid(&e) => {
                        open_at = Some(depth);
                        found |= has_attributes(&e);
                    }
                    None => {}
                }
            }
            Event::Empty(e) => match open_at {
                Some(_) => found = true,
                None if is_grid(&e) => found |= has_attributes(&e),
                None => {}
            },
            Event::End(_) => {
                if depth == 0 {
                    return Err("unbalanced end tag".to_string());
                }
                if open_at == Some(depth) {
                    open_at = None;
                }
                depth -= 1;
            }
            Event::Text(t) if open_at.is_some() => {
                if !t.iter().all(u8::is_ascii_whitespace) {
                    found = true;
                }
            }
            Event::Eof => break,
            _ if open_at.is_some() => found = true,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(format!("{depth} element(s) left unclosed"));
    }
    Ok(found)
}

fn is_grid(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == ELEMENT
}

fn has_attributes(e: &BytesStart<'_>) -> bool {
    e.attributes().next().is_some()
}
