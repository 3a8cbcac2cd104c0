//! Minimal pptx handling: a deck is a zip archive whose slides live at
//! `ppt/slides/slideN.xml`. Placeholder discovery and substitution work on
//! paragraph (`<a:p>`) text assembled from its runs; everything else in the
//! archive passes through untouched.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Compiled once; the pattern is shared across every document in a run.
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{.*?\}\}").expect("valid placeholder pattern"))
}

/// A presentation loaded fully into memory, entry order preserved so that
/// identical inputs re-zip to identical bytes.
pub struct Presentation {
    entries: Vec<ArchiveEntry>,
}

struct ArchiveEntry {
    name: String,
    data: Vec<u8>,
}

fn is_slide(name: &str) -> bool {
    name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
}

impl Presentation {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("{} is not a valid deck archive", path.display()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            entries.push(ArchiveEntry {
                name: entry.name().to_string(),
                data,
            });
        }
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for entry in &self.entries {
            writer.start_file(entry.name.as_str(), options)?;
            writer.write_all(&entry.data)?;
        }
        writer.finish()?;
        Ok(())
    }

    /// Distinct `{{...}}` tokens across every slide paragraph.
    pub fn placeholders(&self) -> anyhow::Result<BTreeSet<String>> {
        let pattern = placeholder_pattern();
        let mut found = BTreeSet::new();
        for entry in self.entries.iter().filter(|e| is_slide(&e.name)) {
            for text in paragraph_texts(&entry.data)? {
                for token in pattern.find_iter(&text) {
                    found.insert(token.as_str().to_string());
                }
            }
        }
        Ok(found)
    }

    /// Apply the replacement map to every slide paragraph containing `{{`.
    pub fn substitute(&mut self, replacements: &HashMap<String, String>) -> anyhow::Result<()> {
        for entry in self.entries.iter_mut().filter(|e| is_slide(&e.name)) {
            entry.data = rewrite_slide_xml(&entry.data, replacements)?;
        }
        Ok(())
    }
}

/// Full text of each `<a:p>` in a slide, runs concatenated in order.
fn paragraph_texts(xml: &[u8]) -> anyhow::Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut texts = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(text) = current.take() {
                        texts.push(text);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let (Some(text), Ok(chunk)) = (current.as_mut(), t.unescape()) {
                    text.push_str(&chunk);
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(texts)
}

/// Stream a slide through untouched, except paragraphs whose text picks up a
/// replacement: those are rebuilt as a single run styled with the first run's
/// properties.
fn rewrite_slide_xml(
    xml: &[u8],
    replacements: &HashMap<String, String>,
) -> anyhow::Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut paragraph: Option<Vec<Event<'static>>> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?.into_owned();
        match event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"p" && paragraph.is_none() => {
                paragraph = Some(vec![Event::Start(e)]);
            }
            Event::End(e) if e.local_name().as_ref() == b"p" && paragraph.is_some() => {
                let mut events = paragraph.take().unwrap_or_default();
                events.push(Event::End(e));
                write_paragraph(&mut writer, &events, replacements)?;
            }
            other => match paragraph.as_mut() {
                Some(events) => events.push(other),
                None => writer.write_event(other)?,
            },
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn write_paragraph(
    writer: &mut Writer<Vec<u8>>,
    events: &[Event<'static>],
    replacements: &HashMap<String, String>,
) -> anyhow::Result<()> {
    let text = collect_run_text(events);
    let rewritten = if text.contains("{{") {
        apply_replacements(&text, replacements)
    } else {
        None
    };

    match rewritten {
        None => {
            for event in events {
                writer.write_event(event.clone())?;
            }
        }
        Some(new_text) => {
            for event in rebuild_paragraph(events, &new_text) {
                writer.write_event(event)?;
            }
        }
    }
    Ok(())
}

fn collect_run_text(events: &[Event<'static>]) -> String {
    let mut text = String::new();
    let mut in_text = false;
    for event in events {
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => {
                if let Ok(chunk) = t.unescape() {
                    text.push_str(&chunk);
                }
            }
            _ => {}
        }
    }
    text
}

fn apply_replacements(text: &str, replacements: &HashMap<String, String>) -> Option<String> {
    let mut updated = text.to_string();
    let mut changed = false;
    for (placeholder, value) in replacements {
        if updated.contains(placeholder.as_str()) {
            updated = updated.replace(placeholder, value);
            changed = true;
        }
    }
    changed.then_some(updated)
}

/// A changed paragraph keeps its `<a:pPr>` and trailing `<a:endParaRPr>` and
/// collapses its runs into one, carrying the first run's `<a:rPr>` subtree so
/// the substituted text keeps the original font, size, bold, italic and color.
fn rebuild_paragraph(events: &[Event<'static>], new_text: &str) -> Vec<Event<'static>> {
    let mut out: Vec<Event<'static>> = Vec::new();
    let last = events.len() - 1;
    out.push(events[0].clone());

    if let Some(end) = subtree_end(events, 1, b"pPr") {
        out.extend(events[1..end].iter().cloned());
    }

    out.push(Event::Start(BytesStart::new("a:r")));
    if let Some((start, end)) = first_run_properties(events) {
        out.extend(events[start..end].iter().cloned());
    }
    out.push(Event::Start(BytesStart::new("a:t")));
    out.push(Event::Text(BytesText::new(new_text).into_owned()));
    out.push(Event::End(BytesEnd::new("a:t")));
    out.push(Event::End(BytesEnd::new("a:r")));

    if let Some(start) = events
        .iter()
        .position(|event| starts_element(event, b"endParaRPr"))
    {
        if let Some(end) = subtree_end(events, start, b"endParaRPr") {
            out.extend(events[start..end].iter().cloned());
        }
    }

    out.push(events[last].clone());
    out
}

fn starts_element(event: &Event<'static>, local: &[u8]) -> bool {
    matches!(
        event,
        Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == local
    )
}

/// Index one past the end of the element subtree starting at `start`, which
/// must be a `Start` or `Empty` event for `local`.
fn subtree_end(events: &[Event<'static>], start: usize, local: &[u8]) -> Option<usize> {
    match events.get(start)? {
        Event::Empty(e) if e.local_name().as_ref() == local => Some(start + 1),
        Event::Start(e) if e.local_name().as_ref() == local => {
            let mut depth = 1usize;
            for (offset, event) in events[start + 1..].iter().enumerate() {
                match event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(start + offset + 2);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Bounds of the first run's `<a:rPr>` subtree, if the paragraph has runs and
/// the first one carries properties.
fn first_run_properties(events: &[Event<'static>]) -> Option<(usize, usize)> {
    let run_start = events
        .iter()
        .position(|event| matches!(event, Event::Start(e) if e.local_name().as_ref() == b"r"))?;
    let run_end = subtree_end(events, run_start, b"r")?;
    for index in run_start + 1..run_end {
        if starts_element(&events[index], b"rPr") {
            let end = subtree_end(events, index, b"rPr")?;
            return Some((index, end));
        }
    }
    None
}
