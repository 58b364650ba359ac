//! Test utilities: wire-format packet builders and fixture documents
//!
//! The builders produce complete encoded packets (header included) so tests
//! and benchmarks can drive the codec, the handlers or a fake stream server
//! with exactly the bytes a real server would send.

#![cfg(any(test, feature = "benchmark"))]

/// Install a tracing subscriber honouring `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Geometry document understood by [`XmlInstrumentLoader`](crate::XmlInstrumentLoader).
///
/// Detector ids `first..=last`, monitors `-1..=-monitors`, and one
/// `<logfile>` reference per entry of `required_logs`.
pub fn instrument_xml(name: &str, first: i64, last: i64, monitors: i64, required_logs: &[&str]) -> String {
    let mut xml = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<instrument name=\"{}\">\n", name);
    xml.push_str(&format!(
        "  <idlist idname=\"detectors\"><id start=\"{}\" end=\"{}\"/></idlist>\n",
        first, last
    ));
    if monitors > 0 {
        xml.push_str("  <idlist idname=\"monitors\">");
        for id in 1..=monitors {
            xml.push_str(&format!("<id val=\"-{}\"/>", id));
        }
        xml.push_str("</idlist>\n");
    }
    for log in required_logs {
        xml.push_str(&format!(
            "  <parameter name=\"{0}-param\"><logfile id=\"{0}\" eq=\"value\"/></parameter>\n",
            log
        ));
    }
    xml.push_str("</instrument>\n");
    xml
}

/// Device descriptor document declaring `(pv_id, pv_name, pv_type, pv_units)` variables.
pub fn descriptor_xml(device_name: &str, variables: &[(u32, &str, &str, &str)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<device xmlns=\"http://public.sns.gov/schema/device.xsd\">\n  <device_name>{}</device_name>\n  <process_variables>\n",
        device_name
    );
    for (id, name, pv_type, units) in variables {
        xml.push_str("    <process_variable>\n");
        xml.push_str(&format!("      <pv_name>{}</pv_name>\n", name));
        xml.push_str(&format!("      <pv_id>{}</pv_id>\n", id));
        xml.push_str(&format!("      <pv_type>{}</pv_type>\n", pv_type));
        if !units.is_empty() {
            xml.push_str(&format!("      <pv_units>{}</pv_units>\n", units));
        }
        xml.push_str("    </process_variable>\n");
    }
    xml.push_str("  </process_variables>\n</device>\n");
    xml
}

/// Encoded packet builders.
pub mod packets {
    use crate::Timestamp;
    use crate::protocol::wire::PayloadWriter;
    use crate::protocol::{MarkerType, PacketHeader, PacketKind, RunStatusCode};

    /// Frame `payload` behind a header of the given kind.
    pub fn frame(kind: PacketKind, timestamp: Timestamp, payload: &[u8]) -> Vec<u8> {
        let header = PacketHeader::new(kind, payload.len() as u32, timestamp);
        let mut out = header.encode().to_vec();
        out.extend_from_slice(payload);
        out
    }

    fn finish(kind: PacketKind, timestamp: Timestamp, writer: PayloadWriter) -> Vec<u8> {
        frame(kind, timestamp, &writer.into_bytes())
    }

    pub fn heartbeat(timestamp: Timestamp) -> Vec<u8> {
        frame(PacketKind::Heartbeat, timestamp, &[])
    }

    /// Pulse reference with `pulse_charge` in units of 10 pC.
    pub fn rtdl(timestamp: Timestamp, pulse_charge: u32) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32((pulse_charge & 0x00FF_FFFF) | (1 << 24));
        for _ in 1..30 {
            writer.u32(0);
        }
        finish(PacketKind::Rtdl, timestamp, writer)
    }

    /// Banked events from a single source: `(bank id, [(tof, pixel)])`.
    pub fn banked_events(timestamp: Timestamp, pulse_charge: u32, banks: &[(u32, &[(u32, u32)])]) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(pulse_charge).u32(0).u32(0).u32(0);
        writer.u32(1).u32(0).u32(0).u32(banks.len() as u32);
        for (bank_id, events) in banks {
            writer.u32(*bank_id).u32(events.len() as u32);
            for (tof, pixel) in events.iter() {
                writer.u32(*tof).u32(*pixel);
            }
        }
        finish(PacketKind::BankedEvent, timestamp, writer)
    }

    /// Beam monitor events: `(monitor id, [tof])`.
    pub fn beam_monitor(timestamp: Timestamp, monitors: &[(u32, &[u32])]) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(0).u32(0).u32(0).u32(0);
        for (monitor_id, events) in monitors {
            writer.u32((monitor_id << 22) | events.len() as u32).u32(1).u32(0);
            for tof in events.iter() {
                writer.u32(tof & 0x001F_FFFF);
            }
        }
        finish(PacketKind::BeamMonitor, timestamp, writer)
    }

    /// Run status with the run starting at `timestamp` and file number 1.
    pub fn run_status(timestamp: Timestamp, run_number: u32, status: RunStatusCode) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(run_number).u32(timestamp.seconds).u32(((status.to_raw() as u32) << 24) | 1);
        finish(PacketKind::RunStatus, timestamp, writer)
    }

    pub fn annotation(timestamp: Timestamp, marker: MarkerType, scan_index: u32, comment: &str) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(((marker.to_raw() as u32) << 16) | comment.len() as u32).u32(scan_index);
        writer.padded(comment.as_bytes());
        finish(PacketKind::StreamAnnotation, timestamp, writer)
    }

    pub fn geometry(timestamp: Timestamp, xml: &str) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(xml.len() as u32).padded(xml.as_bytes());
        finish(PacketKind::Geometry, timestamp, writer)
    }

    pub fn beamline_info(timestamp: Timestamp, id: &str, short_name: &str, long_name: &str) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        let word = (1u32 << 24) | ((id.len() as u32) << 16) | ((short_name.len() as u32) << 8) | long_name.len() as u32;
        writer.u32(word);
        writer.padded(format!("{}{}{}", id, short_name, long_name).as_bytes());
        finish(PacketKind::BeamlineInfo, timestamp, writer)
    }

    pub fn device_descriptor(timestamp: Timestamp, device_id: u32, xml: &str) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(device_id).u32(xml.len() as u32).padded(xml.as_bytes());
        finish(PacketKind::DeviceDescriptor, timestamp, writer)
    }

    pub fn variable_u32(timestamp: Timestamp, device_id: u32, variable_id: u32, value: u32) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(device_id).u32(variable_id).u32(0).u32(value);
        finish(PacketKind::VariableU32, timestamp, writer)
    }

    pub fn variable_double(timestamp: Timestamp, device_id: u32, variable_id: u32, value: f64) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(device_id).u32(variable_id).u32(0).f64(value);
        finish(PacketKind::VariableDouble, timestamp, writer)
    }

    pub fn variable_string(timestamp: Timestamp, device_id: u32, variable_id: u32, value: &str) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.u32(device_id).u32(variable_id).u32(0).u32(value.len() as u32);
        writer.padded(value.as_bytes());
        finish(PacketKind::VariableString, timestamp, writer)
    }
}
