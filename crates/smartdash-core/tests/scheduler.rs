//! Tests for the telemetry scheduler

mod common;

#[cfg(test)]
mod tests {
    use super::common::ScriptedLink;
    use pretty_assertions::assert_eq;
    use smartdash_core::capability::CapabilitySet;
    use smartdash_core::link::ParameterId;
    use smartdash_core::navigation::PageKind;
    use smartdash_core::scheduler::{CadenceConfig, CadencePolicy, Query, SchedulerError, TelemetryScheduler};
    use smartdash_core::settings::Settings;
    use smartdash_core::telemetry::{ClearOutcome, SharedTelemetryState};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    /// Everything the main page can ask for
    const MAIN_PIDS: [ParameterId; 7] = [
        ParameterId::STATUS,
        ParameterId::RPM,
        ParameterId::SPEED,
        ParameterId::MAF,
        ParameterId::FUEL_LEVEL,
        ParameterId::CONTROL_MODULE_VOLTAGE,
        ParameterId::AMBIENT_AIR_TEMP,
    ];

    fn all_supported() -> CapabilitySet {
        CapabilitySet::from_ids(MAIN_PIDS)
    }

    fn scheduler(link: &ScriptedLink, caps: CapabilitySet, page: PageKind) -> (TelemetryScheduler, Arc<SharedTelemetryState>) {
        let state = Arc::new(SharedTelemetryState::default());
        state.set_page(page);
        let scheduler = TelemetryScheduler::new(
            Box::new(link.clone()),
            caps,
            state.clone(),
            CadencePolicy::from_config(&CadenceConfig::default()),
        );
        (scheduler, state)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_main_page_queries_exactly_supported() {
        for mask in 0u32..(1 << MAIN_PIDS.len()) {
            let supported: Vec<ParameterId> = MAIN_PIDS
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, pid)| *pid)
                .collect();

            let link = ScriptedLink::new(&[]);
            let (mut sched, _state) = scheduler(&link, CapabilitySet::from_ids(supported.clone()), PageKind::Main);
            sched.tick(Instant::now()).unwrap();

            let queried: BTreeSet<u8> = link.snapshot().queries.iter().map(|p| p.0).collect();
            let expected: BTreeSet<u8> = supported.iter().map(|p| p.0).collect();
            assert_eq!(queried, expected, "mask {:07b}", mask);
        }
    }

    #[test]
    fn test_fixed_cadence_batches() {
        let link = ScriptedLink::new(&[]);
        let (mut sched, _state) = scheduler(&link, all_supported(), PageKind::Main);
        let log = link.log();
        let t0 = Instant::now();

        sched.tick(t0).unwrap();
        assert_eq!(log.lock().unwrap().queries.len(), 7);

        sched.tick(t0 + ms(100)).unwrap();
        {
            let log = log.lock().unwrap();
            assert_eq!(log.count(ParameterId::RPM), 2);
            assert_eq!(log.count(ParameterId::SPEED), 1);
        }

        sched.tick(t0 + ms(700)).unwrap();
        {
            let log = log.lock().unwrap();
            assert_eq!(log.count(ParameterId::SPEED), 2);
            assert_eq!(log.count(ParameterId::FUEL_LEVEL), 2);
            assert_eq!(log.count(ParameterId::CONTROL_MODULE_VOLTAGE), 1);
        }

        sched.tick(t0 + ms(1300)).unwrap();
        {
            let log = log.lock().unwrap();
            assert_eq!(log.count(ParameterId::RPM), 4);
            assert_eq!(log.count(ParameterId::SPEED), 2);
            assert_eq!(log.count(ParameterId::CONTROL_MODULE_VOLTAGE), 2);
            assert_eq!(log.count(ParameterId::STATUS), 2);
        }
    }

    #[test]
    fn test_delay_override_polls_everything() {
        let link = ScriptedLink::new(&[]);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        state.publish_settings(Settings {
            delay: true,
            ..Settings::default()
        });
        let t0 = Instant::now();
        for i in 0..3 {
            sched.tick(t0 + ms(30 * i)).unwrap();
        }
        let log = link.snapshot();
        for pid in [ParameterId::SPEED, ParameterId::AMBIENT_AIR_TEMP, ParameterId::STATUS] {
            assert_eq!(log.count(pid), 3, "{}", pid);
        }
    }

    #[test]
    fn test_optimize_polls_rpm_and_fuel_only() {
        let link = ScriptedLink::new(&[]);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        state.publish_settings(Settings {
            optimize: true,
            ..Settings::default()
        });
        sched.tick(Instant::now()).unwrap();
        assert_eq!(link.snapshot().queries, vec![ParameterId::RPM, ParameterId::FUEL_LEVEL]);
    }

    #[test]
    fn test_published_sample() {
        let link = ScriptedLink::new(&[])
            .with_value(ParameterId::RPM, 3012.6)
            .with_value(ParameterId::SPEED, 60.0)
            .with_value(ParameterId::MAF, 10.0)
            .with_value(ParameterId::CONTROL_MODULE_VOLTAGE, 14.1)
            .with_codes(&["P0420"]);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        let t0 = Instant::now();
        sched.tick(t0).unwrap();

        let sample = state.sample();
        assert_eq!(sample.sequence, 1);
        assert_eq!(sample.sampled_at, Some(t0));
        assert_eq!(sample.rpm, 3013);
        assert_eq!(sample.mpg, 4.7);
        assert_eq!(sample.voltage, 14.1);
        assert_eq!(sample.trouble_codes.len(), 1);
        assert_eq!(sample.trouble_codes[0].code, "P0420");

        sched.tick(t0 + ms(30)).unwrap();
        let next = state.sample();
        assert_eq!(next.sequence, 2);
        // Unchanged code list keeps the same allocation
        assert!(Arc::ptr_eq(&sample.trouble_codes, &next.trouble_codes));
    }

    #[test]
    fn test_null_readings_keep_last_value() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 900.0);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        sched.tick(Instant::now()).unwrap();
        let sample = state.sample();
        assert_eq!(sample.rpm, 900);
        assert_eq!(sample.speed, 0.0);
        assert_eq!(sample.mpg, 0.0);
    }

    #[test]
    fn test_mpg_needs_both_inputs() {
        let link = ScriptedLink::new(&[])
            .with_value(ParameterId::SPEED, 60.0)
            .with_value(ParameterId::MAF, 10.0);
        let caps = CapabilitySet::from_ids([ParameterId::RPM, ParameterId::SPEED]);
        let (mut sched, state) = scheduler(&link, caps, PageKind::Main);
        sched.tick(Instant::now()).unwrap();
        assert_eq!(state.sample().speed, 60.0);
        assert_eq!(state.sample().mpg, 0.0);
    }

    #[test]
    fn test_speed_and_maf_stored_as_pair() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::SPEED, 60.0);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        sched.tick(Instant::now()).unwrap();
        let log = link.snapshot();
        assert_eq!(log.count(ParameterId::SPEED), 1);
        assert_eq!(log.count(ParameterId::MAF), 1);
        // MAF came back empty, so the speed reading is dropped with it
        let sample = state.sample();
        assert_eq!(sample.speed, 0.0);
        assert_eq!(sample.maf, 0.0);
        assert_eq!(sample.mpg, 0.0);
    }

    #[test]
    fn test_clear_reads_rpm_when_unsupported() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 2500.0);
        let caps = CapabilitySet::from_ids([ParameterId::STATUS]);
        let (mut sched, state) = scheduler(&link, caps.clone(), PageKind::Trouble);
        state.request_clear();
        sched.tick(Instant::now()).unwrap();

        assert_eq!(link.snapshot().count(ParameterId::RPM), 1);
        assert_eq!(state.sample().rpm, 2500);
        let clear = state.clear_request();
        assert_eq!(clear.last_result, Some(ClearOutcome::EngineRunning));
        assert!(clear.pending);
        assert_eq!(link.snapshot().clear_attempts, 0);

        // Engine off: the same ungated read lets the clear through
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 0.0);
        let (mut sched, state) = scheduler(&link, caps, PageKind::Trouble);
        state.request_clear();
        sched.tick(Instant::now()).unwrap();
        assert_eq!(state.clear_request().last_result, Some(ClearOutcome::Success));
        assert_eq!(link.snapshot().clear_attempts, 1);
    }

    #[test]
    fn test_clear_waits_when_rpm_never_known() {
        let link = ScriptedLink::new(&[]);
        let (mut sched, state) = scheduler(&link, CapabilitySet::default(), PageKind::Trouble);
        state.request_clear();
        sched.tick(Instant::now()).unwrap();

        assert_eq!(state.clear_request().last_result, Some(ClearOutcome::EngineRunning));
        assert_eq!(link.snapshot().clear_attempts, 0);
    }

    #[test]
    fn test_no_rpm_read_without_pending_clear() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 0.0);
        let caps = CapabilitySet::from_ids([ParameterId::STATUS]);
        let (mut sched, _state) = scheduler(&link, caps, PageKind::Trouble);
        sched.tick(Instant::now()).unwrap();
        assert_eq!(link.snapshot().count(ParameterId::RPM), 0);
    }

    #[test]
    fn test_clear_with_engine_off_succeeds() {
        let link = ScriptedLink::new(&[])
            .with_value(ParameterId::RPM, 0.0)
            .with_codes(&["P0104"]);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Trouble);
        assert!(state.request_clear());
        sched.tick(Instant::now()).unwrap();

        let clear = state.clear_request();
        assert_eq!(clear.last_result, Some(ClearOutcome::Success));
        assert!(!clear.pending);
        assert!(state.sample().trouble_codes.is_empty());
        assert_eq!(link.snapshot().clear_attempts, 1);
    }

    #[test]
    fn test_rejected_clear_stays_pending() {
        let link = ScriptedLink::new(&[])
            .with_value(ParameterId::RPM, 0.0)
            .with_clear_ack(false);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Rpm);
        state.request_clear();
        sched.tick(Instant::now()).unwrap();

        let clear = state.clear_request();
        assert_eq!(clear.last_result, Some(ClearOutcome::Error));
        assert!(clear.pending);
    }

    #[test]
    fn test_clear_with_engine_running_waits() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 2500.0);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Trouble);
        state.request_clear();
        let t0 = Instant::now();
        sched.tick(t0).unwrap();
        sched.tick(t0 + ms(30)).unwrap();

        let clear = state.clear_request();
        assert_eq!(clear.last_result, Some(ClearOutcome::EngineRunning));
        assert!(clear.pending);
        assert_eq!(link.snapshot().clear_attempts, 0);
    }

    #[test]
    fn test_no_clear_without_request() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 0.0);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Trouble);
        sched.tick(Instant::now()).unwrap();
        assert_eq!(state.clear_request().last_result, None);
        assert_eq!(link.snapshot().clear_attempts, 0);
    }

    #[test]
    fn test_performance_page_polls_rpm_and_speed_each_tick() {
        let link = ScriptedLink::new(&[]);
        let (mut sched, _state) = scheduler(&link, all_supported(), PageKind::Performance);
        let t0 = Instant::now();
        for i in 0..5 {
            sched.tick(t0 + ms(30 * i)).unwrap();
        }
        let log = link.snapshot();
        assert_eq!(log.count(ParameterId::RPM), 5);
        assert_eq!(log.count(ParameterId::SPEED), 5);
        assert_eq!(log.queries.len(), 10);
    }

    #[test]
    fn test_performance_page_ignores_capabilities() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::SPEED, 42.0);
        let (mut sched, state) = scheduler(&link, CapabilitySet::default(), PageKind::Performance);
        sched.tick(Instant::now()).unwrap();
        assert_eq!(link.snapshot().queries, vec![ParameterId::RPM, ParameterId::SPEED]);
        assert_eq!(state.sample().speed, 42.0);
    }

    #[test]
    fn test_other_pages_poll_rpm_only() {
        for page in [PageKind::Custom, PageKind::ShiftLights, PageKind::Settings, PageKind::Info] {
            let link = ScriptedLink::new(&[]);
            let (mut sched, _state) = scheduler(&link, all_supported(), page);
            sched.tick(Instant::now()).unwrap();
            assert_eq!(link.snapshot().queries, vec![ParameterId::RPM], "{}", page);
        }
    }

    #[test]
    fn test_query_fault_is_returned() {
        let link = ScriptedLink::new(&[]).failing_on(ParameterId::SPEED);
        let (mut sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        match sched.tick(Instant::now()) {
            Err(SchedulerError::QueryFault { query, .. }) => assert_eq!(query, Query::Speed),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state.sample().sequence, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_fault() {
        let link = ScriptedLink::new(&[]).failing_on(ParameterId::RPM);
        let (sched, state) = scheduler(&link, all_supported(), PageKind::Main);
        let result = sched.run_until_cancelled(CancellationToken::new()).await;
        assert!(matches!(result, Err(SchedulerError::QueryFault { query: Query::Rpm, .. })));
        assert!(!state.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let link = ScriptedLink::new(&[]).with_value(ParameterId::RPM, 800.0);
        let (sched, state) = scheduler(&link, all_supported(), PageKind::Settings);
        let sched = sched.with_poll_interval(ms(30));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sched.run_until_cancelled(cancel.clone()));

        tokio::time::sleep(ms(100)).await;
        assert!(state.is_connected());
        let seen = state.sample().sequence;
        assert!(seen >= 3, "only {} iterations", seen);

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
        assert!(!state.is_connected());
        assert_eq!(state.sample().rpm, 800);
    }

    #[test]
    fn test_adaptive_cadence_floor() {
        let link = ScriptedLink::new(&[]);
        let state = Arc::new(SharedTelemetryState::default());
        let mut sched = TelemetryScheduler::new(
            Box::new(link.clone()),
            all_supported(),
            state.clone(),
            CadencePolicy::from_config(&CadenceConfig::Adaptive),
        );
        let t0 = Instant::now();
        sched.tick(t0).unwrap();
        // Scripted queries are instant, so the floor applies
        sched.tick(t0 + ms(499)).unwrap();
        assert_eq!(link.snapshot().count(ParameterId::SPEED), 1);
        sched.tick(t0 + ms(500)).unwrap();
        assert_eq!(link.snapshot().count(ParameterId::SPEED), 2);
    }
}
