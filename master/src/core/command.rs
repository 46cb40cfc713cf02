//! Address table and launch command synthesis
//!
//! Both are built exactly once, when the allocation barrier opens, and are
//! shared read-only by every launch task afterwards.

use std::collections::BTreeMap;
use std::fmt;

use super::spec::CohortSpec;

/// Shown in place of the per-process ordinal when a template is displayed
pub const ORDINAL_PLACEHOLDER: &str = "{ordinal}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for AddressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Ordered `host:port` list for the whole cohort
///
/// Hosts appear in lexicographic order and, within a host, by local ordinal,
/// so the process with global ordinal `i` finds itself at entry `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTable {
    entries: Vec<AddressEntry>,
    /// Global ordinal of each host's first process
    offsets: BTreeMap<String, u32>,
}

impl AddressTable {
    /// `per_host` holds how many processes each host received
    pub fn build(per_host: &BTreeMap<String, u32>, port_base: u16) -> Self {
        let mut entries = Vec::new();
        let mut offsets = BTreeMap::new();

        for (host, &count) in per_host {
            offsets.insert(host.clone(), entries.len() as u32);
            for local in 0..count {
                // CohortSpec validation keeps base + busiest host count within u16
                entries.push(AddressEntry {
                    host: host.clone(),
                    port: port_base + local as u16,
                });
            }
        }

        Self { entries, offsets }
    }

    pub fn entries(&self) -> &[AddressEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ordinal: u32) -> Option<&AddressEntry> {
        self.entries.get(ordinal as usize)
    }

    /// Global ordinal of the `local`-th process on `host`
    pub fn ordinal(&self, host: &str, local: u32) -> Option<u32> {
        let offset = *self.offsets.get(host)?;
        let ordinal = offset + local;
        match self.get(ordinal) {
            Some(entry) if entry.host == host => Some(ordinal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Ordinal,
}

/// The single command every worker runs, parameterized by its ordinal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    segments: Vec<Segment>,
}

impl CommandTemplate {
    /// Synthesize the launch command for `spec` over `table`
    ///
    /// Produces
    /// `<program> -t <threads> -n <total> -p <ord> -h h:p ... 1><log>/<app>-container-<ord>.out 2><log>/<app>-container-<ord>.err`;
    /// in test mode the program invocation is wrapped in an `echo` so workers
    /// print their command instead of running it.
    pub fn synthesize(spec: &CohortSpec, table: &AddressTable) -> Self {
        let mut builder = TemplateBuilder::default();

        if spec.test_mode() {
            builder.text("echo 'This is $(hostname): ");
        }
        builder.text(format!(
            "{} -t {} -n {} -p ",
            spec.program().display(),
            spec.thread_count(),
            table.len()
        ));
        builder.ordinal();
        builder.text(" -h");
        for entry in table.entries() {
            builder.text(format!(" {entry}"));
        }
        if spec.test_mode() {
            builder.text("'");
        }

        let log_prefix = format!("{}/{}-container-", spec.log_dir().display(), spec.app_id());
        builder.text(format!(" 1>{log_prefix}"));
        builder.ordinal();
        builder.text(format!(".out 2>{log_prefix}"));
        builder.ordinal();
        builder.text(".err");

        builder.finish()
    }

    /// Substitute `ordinal` for every placeholder
    pub fn instantiate(&self, ordinal: u32) -> String {
        let ordinal = ordinal.to_string();
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.as_str(),
                Segment::Ordinal => ordinal.as_str(),
            })
            .collect()
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => f.write_str(text)?,
                Segment::Ordinal => f.write_str(ORDINAL_PLACEHOLDER)?,
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct TemplateBuilder {
    segments: Vec<Segment>,
}

impl TemplateBuilder {
    fn text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(Segment::Text(last)) = self.segments.last_mut() {
            last.push_str(&text);
        } else {
            self.segments.push(Segment::Text(text));
        }
    }

    fn ordinal(&mut self) {
        self.segments.push(Segment::Ordinal);
    }

    fn finish(self) -> CommandTemplate {
        CommandTemplate {
            segments: self.segments,
        }
    }
}
