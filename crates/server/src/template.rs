//! Page template with named slots.
//!
//! A template carries exactly one head marker and one content marker. It is split
//! into literal segments once, at parse time, so slot values are emitted verbatim
//! and never scanned for markers themselves.

use tether_core::Error;

/// The injection points of a page template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Extra head markup: offline flag, title and feed link.
    Head,
    /// The partial's body markup.
    Content,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Head, Slot::Content];

    pub fn marker(&self) -> &'static str {
        match self {
            Slot::Head => "%_HEADER_REPLACE_%",
            Slot::Content => "%_CONTENT_REPLACE_%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// A parsed page template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    segments: Vec<Segment>,
}

impl PageTemplate {
    /// Split `source` at its markers.
    ///
    /// Fails with `MalformedTemplate` if a marker is missing or appears more than once.
    pub fn parse(source: &str) -> Result<Self, Error> {
        let mut found: Vec<(usize, Slot)> = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            let mut positions = source.match_indices(slot.marker()).map(|(at, _)| at);
            let Some(at) = positions.next() else {
                return Err(Error::MalformedTemplate(format!("missing {}", slot.marker())));
            };
            if positions.next().is_some() {
                return Err(Error::MalformedTemplate(format!("duplicate {}", slot.marker())));
            }
            found.push((at, slot));
        }
        found.sort_by_key(|(at, _)| *at);

        let mut segments = Vec::with_capacity(found.len() * 2 + 1);
        let mut cursor = 0;
        for (at, slot) in found {
            if at < cursor {
                return Err(Error::MalformedTemplate("overlapping markers".into()));
            }
            segments.push(Segment::Text(source[cursor..at].to_string()));
            segments.push(Segment::Slot(slot));
            cursor = at + slot.marker().len();
        }
        segments.push(Segment::Text(source[cursor..].to_string()));

        Ok(Self { segments })
    }

    /// Fill both slots.
    pub fn render(&self, head: &str, content: &str) -> String {
        let capacity = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.len(),
                Segment::Slot(Slot::Head) => head.len(),
                Segment::Slot(Slot::Content) => content.len(),
            })
            .sum();

        let mut out = String::with_capacity(capacity);
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(Slot::Head) => out.push_str(head),
                Segment::Slot(Slot::Content) => out.push_str(content),
            }
        }
        out
    }
}
