//! Instrument layout loading
//!
//! Building real instrument geometry is left to the caller through the
//! [`InstrumentLoader`] trait. The listener only needs the detector ids (to size
//! the buffer) and the monitor ids (to size the monitor sub-buffer).
//! [`XmlInstrumentLoader`] extracts both from the `<idlist>` elements of an
//! instrument definition document; negative ids are monitors.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::buffer::DetectorIndexMap;
use crate::{ListenerError, Result};

/// Detector and monitor ids of an instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentLayout {
    pub detector_ids: Vec<i64>,
    /// Monitor detector ids (negative in instrument definitions)
    pub monitor_ids: Vec<i64>,
}

impl InstrumentLayout {
    pub fn detector_map(&self) -> DetectorIndexMap {
        DetectorIndexMap::from_ids(self.detector_ids.iter().copied())
    }

    pub fn monitor_map(&self) -> DetectorIndexMap {
        DetectorIndexMap::from_ids(self.monitor_ids.iter().copied())
    }
}

/// Builds the instrument layout once per run from the geometry packet.
pub trait InstrumentLoader: Send + Sync {
    fn load(&self, instrument_name: &str, geometry_xml: &str) -> Result<InstrumentLayout>;
}

impl<F> InstrumentLoader for F
where
    F: Fn(&str, &str) -> Result<InstrumentLayout> + Send + Sync,
{
    fn load(&self, instrument_name: &str, geometry_xml: &str) -> Result<InstrumentLayout> {
        self(instrument_name, geometry_xml)
    }
}

/// Loader reading `<idlist>` ids straight out of the instrument definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlInstrumentLoader;

impl InstrumentLoader for XmlInstrumentLoader {
    fn load(&self, instrument_name: &str, geometry_xml: &str) -> Result<InstrumentLayout> {
        let ids = scan_id_lists(geometry_xml).map_err(|details| ListenerError::instrument(instrument_name, details))?;

        let (monitor_ids, detector_ids): (Vec<i64>, Vec<i64>) = ids.into_iter().partition(|id| *id < 0);
        if detector_ids.is_empty() {
            return Err(ListenerError::instrument(instrument_name, "Instrument defines no detectors"));
        }

        info!(
            instrument = instrument_name,
            detectors = detector_ids.len(),
            monitors = monitor_ids.len(),
            "Loaded instrument layout"
        );
        Ok(InstrumentLayout { detector_ids, monitor_ids })
    }
}

/// Collect the ids of every `<logfile id="...">` reference in a geometry document.
///
/// These logs must have at least one sample before the buffer is initialized.
pub fn required_logs(geometry_xml: &str) -> Result<BTreeSet<String>> {
    let mut reader = Reader::from_str(geometry_xml);
    let mut logs = BTreeSet::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                if element.local_name().as_ref() == b"logfile" {
                    let id = attribute(&element, b"id").map_err(|e| ListenerError::parse("Geometry", e))?;
                    logs.extend(id);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ListenerError::parse(
                    "Geometry",
                    format!("XML error at position {}: {}", reader.buffer_position(), e),
                ));
            }
        }
    }

    debug!(required = logs.len(), "Scanned geometry for required logs");
    Ok(logs)
}

/// Most detector ids a single instrument definition may expand to.
pub const MAX_RANGE_IDS: usize = 4_000_000;

fn scan_id_lists(xml: &str) -> std::result::Result<Vec<i64>, String> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    let mut depth_in_idlist = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                if element.local_name().as_ref() == b"idlist" {
                    depth_in_idlist += 1;
                } else if depth_in_idlist > 0 && element.local_name().as_ref() == b"id" {
                    push_ids(&element, &mut ids)?;
                }
            }
            Ok(Event::Empty(element)) => {
                if depth_in_idlist > 0 && element.local_name().as_ref() == b"id" {
                    push_ids(&element, &mut ids)?;
                }
            }
            Ok(Event::End(element)) => {
                if element.local_name().as_ref() == b"idlist" {
                    depth_in_idlist = depth_in_idlist.saturating_sub(1);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("XML error at position {}: {}", reader.buffer_position(), e)),
        }
    }

    Ok(ids)
}

fn push_ids(element: &BytesStart<'_>, ids: &mut Vec<i64>) -> std::result::Result<(), String> {
    if let Some(val) = attribute(element, b"val")? {
        ids.push(parse_id(&val)?);
        return Ok(());
    }

    let start = attribute(element, b"start")?.ok_or("<id> without val or start")?;
    let end = attribute(element, b"end")?.ok_or("<id> with start but no end")?;
    let step = match attribute(element, b"step")? {
        Some(step) => parse_id(&step)?,
        None => 1,
    };
    if step == 0 {
        return Err("<id> step must not be zero".to_string());
    }

    let (start, end) = (parse_id(&start)?, parse_id(&end)?);
    if (step > 0 && end < start) || (step < 0 && end > start) {
        return Ok(());
    }
    let count = (end as i128 - start as i128) / step as i128 + 1;
    if ids.len() as i128 + count > MAX_RANGE_IDS as i128 {
        return Err(format!(
            "<id start=\"{}\" end=\"{}\" step=\"{}\"> expands past the limit of {} ids",
            start, end, step, MAX_RANGE_IDS
        ));
    }

    let mut id = start;
    for _ in 0..count {
        ids.push(id);
        match id.checked_add(step) {
            Some(next) => id = next,
            None => break,
        }
    }
    Ok(())
}

fn parse_id(text: &str) -> std::result::Result<i64, String> {
    text.trim().parse::<i64>().map_err(|e| format!("Invalid detector id '{}': {}", text, e))
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> std::result::Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
