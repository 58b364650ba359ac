//! Per-packet handlers
//!
//! [`ListenerState::handle_packet`] dispatches on the packet body. Each handler
//! returns whether the packet was processed; `false` covers filtered, dropped
//! and rejected packets alike. Only fatal conditions (a failed instrument load
//! or an unparseable geometry document) are returned as errors.

use tracing::{debug, info, trace, warn};

use crate::buffer::{PAUSE_LOG, PROTON_CHARGE_LOG, SCAN_INDEX_LOG};
use crate::descriptor::DeviceDescriptor;
use crate::instrument::required_logs;
use crate::protocol::{
    AnnotationPacket, BankedEventPacket, BeamMonitorPacket, BeamlineInfoPacket,
    DeviceDescriptorPacket, GeometryPacket, MarkerType, Packet, PacketBody, PacketHeader,
    RunStatusCode, RunStatusPacket, VariableValuePacket,
};
use crate::replay::FilterDecision;
use crate::run::RunDetails;
use crate::state::ListenerState;
use crate::{LogValue, Result, RunStatus};

impl ListenerState {
    /// Apply one decoded packet, then initialize the buffer if it just became possible.
    pub(crate) fn handle_packet(&mut self, packet: Packet) -> Result<bool> {
        let Packet { header, body } = packet;
        let processed = match body {
            PacketBody::Rtdl(_) => {
                self.rtdl_pulse_id = Some(header.timestamp.pulse_id());
                trace!(pulse = %header.timestamp, "RTDL pulse reference");
                true
            }
            PacketBody::BankedEvent(events) => self.handle_banked_event(&header, &events),
            PacketBody::BeamMonitor(monitor) => self.handle_beam_monitor(&header, &monitor),
            PacketBody::RunStatus(status) => self.handle_run_status(&header, &status),
            PacketBody::Annotation(annotation) => self.handle_annotation(&header, &annotation),
            PacketBody::Geometry(geometry) => self.handle_geometry(geometry)?,
            PacketBody::BeamlineInfo(info) => self.handle_beamline_info(info),
            PacketBody::DeviceDescriptor(descriptor) => self.handle_device_descriptor(&descriptor),
            PacketBody::VariableValue(value) => self.handle_variable(header, value),
            PacketBody::Heartbeat => {
                trace!("Heartbeat");
                true
            }
            PacketBody::ClientHello(_) => {
                debug!("Ignoring client hello echoed by server");
                false
            }
            PacketBody::Unknown { base_type } => {
                debug!(base_type, "Skipping unhandled packet type");
                false
            }
        };

        if !self.buffer.is_initialized() {
            self.initialize_if_ready()?;
        }
        Ok(processed)
    }

    /// Whether a packet falls inside the filtered window before the requested start.
    ///
    /// The first packet that satisfies the start condition disables filtering,
    /// declares logs for every registered variable and replays withheld values.
    pub(crate) fn ignore_packet(&mut self, header: &PacketHeader, status: Option<RunStatusCode>) -> bool {
        match self.filter.check(header.timestamp, status) {
            FilterDecision::Pass => false,
            FilterDecision::Ignore => true,
            FilterDecision::Opened => {
                self.replay_withheld_variables();
                false
            }
        }
    }

    fn replay_withheld_variables(&mut self) {
        let declared: Vec<_> = self.registry.iter().map(|(_, info)| info.clone()).collect();
        for info in &declared {
            self.buffer.declare_log(&info.name, info.value_type, info.units.as_deref());
        }

        let cached = self.replay.take_all();
        info!(variables = declared.len(), replayed = cached.len(), "Replaying withheld variable values");
        for entry in cached {
            self.handle_variable(entry.header, entry.packet);
        }
    }

    fn events_blocked(&self, kind: &str) -> bool {
        if self.run_paused && !self.keep_paused_events {
            trace!(kind, "Run paused, dropping events");
            return true;
        }
        if !self.buffer.is_initialized() {
            debug!(kind, "Buffer not initialized, dropping events");
            return true;
        }
        false
    }

    fn handle_banked_event(&mut self, header: &PacketHeader, packet: &BankedEventPacket) -> bool {
        if self.ignore_packet(header, None) || self.events_blocked("banked event") {
            return false;
        }

        let pulse_id = header.timestamp.pulse_id();
        if self.rtdl_pulse_id != Some(pulse_id) {
            warn!(
                pulse = %header.timestamp,
                rtdl_pulse_id = ?self.rtdl_pulse_id,
                "Banked event pulse does not match latest RTDL packet, dropping"
            );
            return false;
        }

        let pulse_time = header.timestamp;
        self.buffer.append_log(PROTON_CHARGE_LOG, pulse_time, LogValue::Double(packet.pulse_charge as f64 * 10.0));

        let mut added = 0usize;
        let mut unknown = 0usize;
        for bank in packet.sources.iter().flat_map(|source| &source.banks) {
            if bank.is_sentinel() {
                continue;
            }
            for event in &bank.events {
                if self.buffer.add_event(event.pixel, event.tof_micros(), pulse_time) {
                    added += 1;
                } else {
                    unknown += 1;
                }
            }
        }

        if unknown > 0 {
            debug!(unknown, pulse = %pulse_time, "Dropped events for unknown detectors");
        }
        trace!(added, pulse = %pulse_time, "Banked events accumulated");
        true
    }

    fn handle_beam_monitor(&mut self, header: &PacketHeader, packet: &BeamMonitorPacket) -> bool {
        if self.ignore_packet(header, None) || self.events_blocked("beam monitor") {
            return false;
        }

        let pulse_time = header.timestamp;
        for section in &packet.monitors {
            self.buffer.add_monitor_counts(section.monitor_id, section.events.len() as u64, pulse_time);

            let unknown = section
                .events
                .iter()
                .filter(|event| !self.buffer.add_monitor_event(section.monitor_id, event.tof_micros(), pulse_time))
                .count();
            if unknown > 0 {
                warn!(monitor_id = section.monitor_id, unknown, "Monitor not present in instrument, events dropped");
            }
        }
        true
    }

    fn handle_run_status(&mut self, header: &PacketHeader, packet: &RunStatusPacket) -> bool {
        if self.ignore_packet(header, Some(packet.status)) {
            return false;
        }

        match packet.status {
            RunStatusCode::NewRun => self.run.new_run(self.buffer.is_initialized()),
            RunStatusCode::EndRun => self.run.end_run(),
            other => debug!(status = ?other, run_number = packet.run_number, "Run status"),
        }

        if packet.run_number != 0 {
            let details = RunDetails { run_number: packet.run_number, run_start: packet.run_start };
            if self.run.status() == RunStatus::BeginRun {
                self.run.defer_details(details);
            } else if !self.buffer.has_run_number() {
                info!(run_number = packet.run_number, run_start = %packet.run_start, "Recording run details");
                self.buffer.set_run_metadata(details.run_number, details.run_start);
            }
        }
        true
    }

    fn handle_annotation(&mut self, header: &PacketHeader, packet: &AnnotationPacket) -> bool {
        if self.ignore_packet(header, None) {
            return false;
        }

        let time = header.timestamp;
        match packet.marker {
            MarkerType::ScanStart => {
                self.buffer.append_log(SCAN_INDEX_LOG, time, LogValue::Int(packet.scan_index as i64));
                info!(scan_index = packet.scan_index, "Scan started");
            }
            MarkerType::ScanStop => {
                self.buffer.append_log(SCAN_INDEX_LOG, time, LogValue::Int(0));
                info!(scan_index = packet.scan_index, "Scan stopped");
            }
            MarkerType::Pause => {
                self.buffer.append_log(PAUSE_LOG, time, LogValue::Int(1));
                self.run_paused = true;
                info!("Run paused");
            }
            MarkerType::Resume => {
                self.buffer.append_log(PAUSE_LOG, time, LogValue::Int(0));
                self.run_paused = false;
                info!("Run resumed");
            }
            MarkerType::Generic | MarkerType::OverallRunComment | MarkerType::Other(_) => {}
        }

        if !packet.comment.is_empty() {
            info!(marker = ?packet.marker, comment = %packet.comment, "Annotation");
        }
        true
    }

    fn handle_geometry(&mut self, packet: GeometryPacket) -> Result<bool> {
        if self.geometry_xml.is_some() {
            trace!("Geometry already captured for this run");
            return Ok(true);
        }

        self.required_logs = required_logs(&packet.xml)?;
        info!(
            bytes = packet.xml.len(),
            required_logs = ?self.required_logs,
            "Captured instrument geometry"
        );
        self.geometry_xml = Some(packet.xml);
        Ok(true)
    }

    fn handle_beamline_info(&mut self, packet: BeamlineInfoPacket) -> bool {
        if self.instrument_name.is_none() {
            info!(
                instrument = %packet.long_name,
                beamline = %packet.id,
                target_station = packet.target_station,
                "Captured beamline info"
            );
            self.instrument_name = Some(packet.long_name);
        }
        true
    }

    fn handle_device_descriptor(&mut self, packet: &DeviceDescriptorPacket) -> bool {
        let descriptor = match DeviceDescriptor::parse(packet.device_id, &packet.xml) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(device_id = packet.device_id, error = %e, "Dropping malformed device descriptor");
                return false;
            }
        };

        let filtering = self.filter.is_active();
        for variable in descriptor.variables {
            if !filtering {
                self.buffer.declare_log(&variable.info.name, variable.info.value_type, variable.info.units.as_deref());
            }
            self.registry.register(descriptor.device_id, variable.variable_id, variable.info);
        }
        true
    }

    fn handle_variable(&mut self, header: PacketHeader, packet: VariableValuePacket) -> bool {
        if self.ignore_packet(&header, None) {
            self.replay.stash(header, packet);
            return false;
        }

        let Some(info) = self.registry.lookup(packet.device_id, packet.variable_id) else {
            warn!(
                device_id = packet.device_id,
                variable_id = packet.variable_id,
                "Value for unknown process variable, dropping"
            );
            return false;
        };
        let (name, value_type) = (info.name.clone(), info.value_type);
        let units = info.units.clone();

        self.buffer.declare_log(&name, value_type, units.as_deref());
        let supplied = packet.value.value_type();
        if self.buffer.append_log(&name, header.timestamp, packet.value) {
            true
        } else {
            warn!(log = %name, expected = %value_type, supplied = %supplied, "Variable value type mismatch, dropping");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HEADER_SIZE, UNMAPPED_BANK};
    use crate::test_utils::{descriptor_xml, instrument_xml, packets};
    use crate::{InstrumentLayout, ListenerError, LogValueType, Timestamp, XmlInstrumentLoader};
    use std::sync::Arc;

    fn decode(frame: &[u8]) -> Packet {
        let header = PacketHeader::parse(frame).expect("valid header");
        Packet::decode(header, &frame[HEADER_SIZE..]).expect("valid payload")
    }

    fn feed(state: &mut ListenerState, frame: &[u8]) -> bool {
        state.handle_packet(decode(frame)).expect("handler succeeds")
    }

    fn streaming_state(start: Timestamp) -> ListenerState {
        let mut state = ListenerState::new(false, Arc::new(XmlInstrumentLoader));
        state.begin_streaming(start);
        state
    }

    /// State with pixels 1..=4, monitors -1/-2 and an initialized buffer.
    fn initialized_state() -> ListenerState {
        let mut state = streaming_state(Timestamp::ZERO);
        let ts = Timestamp::new(100, 0);
        feed(&mut state, &packets::geometry(ts, &instrument_xml("TEST", 1, 4, 2, &[])));
        feed(&mut state, &packets::beamline_info(ts, "BL1", "TST", "TEST"));
        assert!(state.buffer.is_initialized());
        state
    }

    #[test]
    fn known_pixels_accumulate_and_unmatched_pulses_are_rejected() {
        let mut state = initialized_state();
        let pulse = Timestamp::new(200, 500);

        assert!(feed(&mut state, &packets::rtdl(pulse, 3)));
        let events = packets::banked_events(pulse, 3, &[(1, &[(100, 1), (200, 2), (300, 99)])]);
        assert!(feed(&mut state, &events));
        assert_eq!(state.buffer.total_events(), 2);

        let stale = packets::banked_events(Timestamp::new(201, 0), 3, &[(1, &[(100, 1)])]);
        assert!(!feed(&mut state, &stale));
        assert_eq!(state.buffer.total_events(), 2);

        let charge = state.buffer.log(PROTON_CHARGE_LOG).expect("charge log");
        assert_eq!(charge.values_f64(), vec![30.0]);
    }

    #[test]
    fn sentinel_banks_are_skipped() {
        let mut state = initialized_state();
        let pulse = Timestamp::new(300, 0);
        feed(&mut state, &packets::rtdl(pulse, 1));
        let events = packets::banked_events(
            pulse,
            1,
            &[(UNMAPPED_BANK, &[(1, 1), (1, 2)]), (crate::protocol::ERROR_BANK, &[(1, 3)]), (4, &[(1, 4)])],
        );
        feed(&mut state, &events);
        assert_eq!(state.buffer.total_events(), 1);
        assert_eq!(state.buffer.events_for_pixel(4).len(), 1);
    }

    #[test]
    fn events_before_initialization_are_dropped() {
        let mut state = streaming_state(Timestamp::ZERO);
        let pulse = Timestamp::new(10, 0);
        feed(&mut state, &packets::rtdl(pulse, 1));
        assert!(!feed(&mut state, &packets::banked_events(pulse, 1, &[(1, &[(5, 1)])])));
        assert_eq!(state.buffer.total_events(), 0);
    }

    #[test]
    fn paused_runs_drop_events_unless_configured() {
        let mut state = initialized_state();
        let pulse = Timestamp::new(400, 0);
        feed(&mut state, &packets::annotation(pulse, MarkerType::Pause, 0, ""));
        feed(&mut state, &packets::rtdl(pulse, 1));
        assert!(!feed(&mut state, &packets::banked_events(pulse, 1, &[(1, &[(5, 1)])])));

        state.keep_paused_events = true;
        assert!(feed(&mut state, &packets::banked_events(pulse, 1, &[(1, &[(5, 1)])])));

        feed(&mut state, &packets::annotation(pulse, MarkerType::Resume, 0, ""));
        assert!(!state.run_paused);
        let pause = state.buffer.log(PAUSE_LOG).expect("pause log");
        assert_eq!(pause.values_f64(), vec![1.0, 0.0]);
    }

    #[test]
    fn monitor_events_count_and_accumulate() {
        let mut state = initialized_state();
        let pulse = Timestamp::new(500, 0);
        feed(&mut state, &packets::beam_monitor(pulse, &[(1, &[10, 20, 30]), (5, &[40])]));

        assert_eq!(state.buffer.monitor_counts().get(&1), Some(&3));
        assert_eq!(state.buffer.monitor_counts().get(&5), Some(&1));

        feed(&mut state, &packets::beam_monitor(Timestamp::new(501, 0), &[(1, &[50, 60])]));
        let counts = state.buffer.log("monitor1_counts").expect("monitor 1 counts log");
        assert_eq!(counts.value_type(), LogValueType::Int);
        assert_eq!(counts.values_f64(), vec![3.0, 5.0]);
        assert_eq!(
            state.buffer.log("monitor5_counts").and_then(|log| log.last_value()),
            Some(&LogValue::Int(1))
        );
        let monitors = state.buffer.monitor_buffer().expect("monitor buffer");
        assert_eq!(monitors.total_events(), 5);
    }

    #[test]
    fn scan_markers_update_scan_index() {
        let mut state = initialized_state();
        feed(&mut state, &packets::annotation(Timestamp::new(1, 0), MarkerType::ScanStart, 4, "start"));
        feed(&mut state, &packets::annotation(Timestamp::new(2, 0), MarkerType::ScanStop, 4, ""));
        feed(&mut state, &packets::annotation(Timestamp::new(3, 0), MarkerType::Generic, 0, "just a note"));
        let scan = state.buffer.log(SCAN_INDEX_LOG).expect("scan log");
        assert_eq!(scan.values_f64(), vec![4.0, 0.0]);
    }

    #[test]
    fn variable_before_descriptor_is_dropped_after_is_delivered() {
        let mut state = streaming_state(Timestamp::ZERO);
        let ts = Timestamp::new(10, 0);
        assert!(!feed(&mut state, &packets::variable_double(ts, 3, 1, 1.5)));

        let xml = descriptor_xml("Env", &[(1, "temp", "double", "K")]);
        assert!(feed(&mut state, &packets::device_descriptor(ts, 3, &xml)));
        assert!(feed(&mut state, &packets::variable_double(ts, 3, 1, 1.5)));

        let log = state.buffer.log("temp").expect("declared by descriptor");
        assert_eq!(log.values_f64(), vec![1.5]);
        assert_eq!(log.units(), Some("K"));
    }

    #[test]
    fn mismatched_variable_types_are_dropped() {
        let mut state = streaming_state(Timestamp::ZERO);
        let ts = Timestamp::new(10, 0);
        let xml = descriptor_xml("Env", &[(1, "count", "integer", ""), (2, "temp", "double", "")]);
        feed(&mut state, &packets::device_descriptor(ts, 3, &xml));

        assert!(!feed(&mut state, &packets::variable_string(ts, 3, 1, "seven")));
        assert!(feed(&mut state, &packets::variable_u32(ts, 3, 2, 7)));
        assert_eq!(state.buffer.log("temp").map(|l| l.values_f64()), Some(vec![7.0]));
        assert_eq!(state.buffer.log("count").map(|l| l.len()), Some(0));
    }

    #[test]
    fn filtered_values_are_withheld_then_replayed() {
        let mut state = streaming_state(Timestamp::START_OF_RUN);
        let ts = Timestamp::new(10, 0);
        let xml = descriptor_xml(
            "Env",
            &[(1, "temp", "double", "K"), (2, "mode", "string", ""), (3, "setpoint", "double", "K")],
        );
        feed(&mut state, &packets::device_descriptor(ts, 3, &xml));
        assert!(!state.buffer.has_log("temp"));
        assert!(!state.buffer.has_log("setpoint"));

        for (i, value) in [1.0, 2.0, 3.0].iter().enumerate() {
            let at = Timestamp::new(11 + i as u32, 0);
            assert!(!feed(&mut state, &packets::variable_double(at, 3, 1, *value)));
        }
        feed(&mut state, &packets::variable_string(ts, 3, 2, "auto"));
        feed(&mut state, &packets::annotation(ts, MarkerType::Pause, 0, ""));

        assert_eq!(state.replay.len(), 2);
        assert_eq!(state.buffer.log(PAUSE_LOG).map(|l| l.len()), Some(0));
        assert!(!state.run_paused);

        feed(&mut state, &packets::run_status(Timestamp::new(20, 0), 42, RunStatusCode::NewRun));
        assert!(state.replay.is_empty());
        assert!(!state.filter.is_active());
        assert_eq!(state.buffer.log("temp").map(|l| l.values_f64()), Some(vec![3.0]));
        assert_eq!(
            state.buffer.log("mode").and_then(|l| l.last_value().cloned()),
            Some(LogValue::String("auto".into()))
        );
        assert_eq!(state.buffer.log("temp").map(|l| l.value_type()), Some(LogValueType::Double));

        // Described but never sent: declared when the gate opens, still empty
        let setpoint = state.buffer.log("setpoint").expect("setpoint declared at replay");
        assert!(setpoint.is_empty());
        assert_eq!(setpoint.units(), Some("K"));
    }

    #[test]
    fn initialized_buffer_is_not_ready_while_waiting_for_run_start() {
        let mut state = streaming_state(Timestamp::START_OF_RUN);
        let ts = Timestamp::new(10, 0);
        feed(&mut state, &packets::geometry(ts, &instrument_xml("TEST", 1, 4, 0, &[])));
        feed(&mut state, &packets::beamline_info(ts, "BL1", "TST", "TEST"));
        assert!(state.buffer.is_initialized());
        assert!(state.filter.is_active());

        let err = state.try_extract().unwrap_err();
        assert!(matches!(err, ListenerError::NotReady { .. }));
        assert!(err.is_retryable());

        feed(&mut state, &packets::run_status(Timestamp::new(11, 0), 1, RunStatusCode::NewRun));
        assert!(state.try_extract().is_ok());
    }

    #[test]
    fn new_run_without_initialization_goes_straight_to_running() {
        let mut state = streaming_state(Timestamp::ZERO);
        feed(&mut state, &packets::run_status(Timestamp::new(5, 0), 9, RunStatusCode::NewRun));
        assert_eq!(state.run.status(), RunStatus::Running);
        assert!(!state.run.reads_paused());
        assert_eq!(state.buffer.run_metadata().run_number, Some(9));
    }

    #[test]
    fn new_run_after_initialization_defers_details() {
        let mut state = initialized_state();
        feed(&mut state, &packets::run_status(Timestamp::new(600, 0), 11, RunStatusCode::NewRun));
        assert_eq!(state.run.status(), RunStatus::BeginRun);
        assert!(state.run.reads_paused());
        assert_eq!(state.buffer.run_metadata().run_number, None);

        assert_eq!(state.advance_run_status().ok(), Some(RunStatus::BeginRun));
        assert_eq!(state.buffer.run_metadata().run_number, Some(11));
        assert!(!state.buffer.is_initialized());
        assert!(state.geometry_xml.is_none());
        assert!(state.registry.is_empty());
        assert_eq!(state.advance_run_status().ok(), Some(RunStatus::Running));
    }

    #[test]
    fn required_logs_gate_initialization() {
        let mut state = streaming_state(Timestamp::ZERO);
        let ts = Timestamp::new(50, 0);
        feed(&mut state, &packets::geometry(ts, &instrument_xml("TEST", 1, 4, 0, &["detz"])));
        feed(&mut state, &packets::beamline_info(ts, "BL1", "TST", "TEST"));
        assert!(!state.buffer.is_initialized());

        let xml = descriptor_xml("Motors", &[(1, "detz", "double", "mm")]);
        feed(&mut state, &packets::device_descriptor(ts, 2, &xml));
        assert!(!state.buffer.is_initialized());

        feed(&mut state, &packets::variable_double(ts, 2, 1, 4.0));
        assert!(state.buffer.is_initialized());
        assert_eq!(state.buffer.detector_count(), 4);
    }

    #[test]
    fn loader_failure_is_fatal() {
        let loader = |name: &str, _xml: &str| -> Result<InstrumentLayout> {
            Err(ListenerError::instrument(name, "no such instrument"))
        };
        let mut state = ListenerState::new(false, Arc::new(loader));
        state.begin_streaming(Timestamp::ZERO);
        let ts = Timestamp::new(1, 0);
        feed(&mut state, &packets::geometry(ts, "<instrument/>"));
        let result = state.handle_packet(decode(&packets::beamline_info(ts, "X", "Y", "Z")));
        assert!(matches!(result, Err(ListenerError::Instrument { .. })));
    }

    #[test]
    fn unknown_packets_are_skipped() {
        let mut state = streaming_state(Timestamp::ZERO);
        let frame = packets::frame(crate::protocol::PacketKind::Unknown(0x7001), Timestamp::ZERO, &[0; 8]);
        assert!(!feed(&mut state, &frame));
    }

    mod property_tests {
        use super::*;
        use crate::protocol::ERROR_BANK;
        use proptest::prelude::*;

        const START_SECONDS: u32 = 100;

        fn bank_id() -> impl Strategy<Value = u32> {
            prop_oneof![4 => 0u32..4, 1 => Just(UNMAPPED_BANK), 1 => Just(ERROR_BANK)]
        }

        fn pulse() -> impl Strategy<Value = (u32, u32, Vec<(u32, u32)>)> {
            (90u32..110, bank_id(), prop::collection::vec((0u32..100_000, 1u32..=4), 0..5))
        }

        proptest! {
            #[test]
            fn only_events_from_the_start_onward_are_counted(pulses in prop::collection::vec(pulse(), 1..20)) {
                let mut state = streaming_state(Timestamp::new(START_SECONDS, 0));
                let setup = Timestamp::new(1, 0);
                feed(&mut state, &packets::geometry(setup, &instrument_xml("TEST", 1, 4, 0, &[])));
                feed(&mut state, &packets::beamline_info(setup, "BL1", "TST", "TEST"));
                prop_assert!(state.buffer.is_initialized());

                let mut gate_open = false;
                let mut expected = 0usize;
                for (index, (seconds, bank, events)) in pulses.iter().enumerate() {
                    let ts = Timestamp::new(*seconds, index as u32);
                    feed(&mut state, &packets::rtdl(ts, 1));
                    feed(&mut state, &packets::banked_events(ts, 1, &[(*bank, events.as_slice())]));

                    gate_open |= *seconds >= START_SECONDS;
                    if gate_open && *bank != UNMAPPED_BANK && *bank != ERROR_BANK {
                        expected += events.len();
                    }
                }

                prop_assert_eq!(state.buffer.total_events(), expected);
                prop_assert_eq!(state.filter.is_active(), !gate_open);
            }
        }
    }
}
