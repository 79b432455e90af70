//! Live analysis worker.
//!
//! One thread owns every [`Phonocardiogram`]. Callers push samples through a
//! command channel; the worker recomputes on a fixed tick and publishes
//! immutable snapshots that [`PcgMonitor::poll`] collects.

use crate::config::PcgOptions;
use crate::filters::{fetal_heart_sound, maternal_heart_sound};
use crate::metrics::hrv::HrvReport;
use crate::pipeline::{PcgSnapshot, Phonocardiogram, SoundKind};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const COMMAND_CAPACITY: usize = 256;
const UPDATE_CAPACITY: usize = 64;
const INDICES_PERIOD: Duration = Duration::from_secs(1);

pub enum MonitorCommand {
    /// Live samples, already at the waveform rate.
    Ingest(Vec<f64>),
    /// A finished recording; switches to replay.
    LoadRecording(Vec<f64>),
    Reset,
    Shutdown,
}

enum MonitorUpdate {
    Snapshot(Arc<PcgSnapshot>),
    Indices(SoundKind, HrvReport),
}

/// Latest published state per sound.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<SoundKind, Arc<PcgSnapshot>>,
    updates: usize,
}

impl SnapshotStore {
    pub fn get(&self, kind: SoundKind) -> Option<Arc<PcgSnapshot>> {
        self.snapshots.get(&kind).cloned()
    }

    pub fn original(&self) -> Option<Arc<PcgSnapshot>> {
        self.get(SoundKind::Original)
    }

    pub fn hrv(&self, kind: SoundKind) -> Option<&HrvReport> {
        self.snapshots.get(&kind).map(|snap| &snap.hrv)
    }

    /// Number of updates applied so far.
    pub fn updates(&self) -> usize {
        self.updates
    }

    fn apply(&mut self, update: MonitorUpdate) {
        self.updates += 1;
        match update {
            MonitorUpdate::Snapshot(snapshot) => {
                self.snapshots.insert(snapshot.kind, snapshot);
            }
            MonitorUpdate::Indices(kind, report) => {
                if let Some(current) = self.snapshots.get_mut(&kind) {
                    Arc::make_mut(current).hrv = report;
                }
            }
        }
    }
}

/// Client side of the live monitor.
pub struct PcgMonitor {
    store: SnapshotStore,
    command_tx: Sender<MonitorCommand>,
    update_rx: Receiver<MonitorUpdate>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PcgMonitor {
    pub fn spawn(options: PcgOptions) -> Result<Self> {
        let worker_state = MonitorWorker::new(&options)?;
        let (command_tx, command_rx) = bounded(COMMAND_CAPACITY);
        let (update_tx, update_rx) = bounded(UPDATE_CAPACITY);
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let worker = std::thread::Builder::new()
            .name("pcg-monitor".into())
            .spawn(move || worker_state.run(command_rx, update_tx, worker_cancel))?;
        Ok(Self {
            store: SnapshotStore::default(),
            command_tx,
            update_rx,
            cancel,
            worker: Some(worker),
        })
    }

    /// Sender for producer threads (e.g. a capture loop).
    pub fn command_sender(&self) -> Sender<MonitorCommand> {
        self.command_tx.clone()
    }

    pub fn ingest(&self, samples: Vec<f64>) -> Result<()> {
        self.command_tx
            .send(MonitorCommand::Ingest(samples))
            .map_err(|e| anyhow!("Failed to submit samples: {e}"))
    }

    pub fn load_recording(&self, samples: Vec<f64>) -> Result<()> {
        self.command_tx
            .send(MonitorCommand::LoadRecording(samples))
            .map_err(|e| anyhow!("Failed to load recording: {e}"))
    }

    pub fn reset(&self) -> Result<()> {
        self.command_tx
            .send(MonitorCommand::Reset)
            .map_err(|e| anyhow!("Failed to reset monitor: {e}"))
    }

    /// Ask the worker to stop at its next tick.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Drain pending updates into the store. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        self.route_pending_updates()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn snapshot(&self, kind: SoundKind) -> Option<Arc<PcgSnapshot>> {
        self.store.get(kind)
    }

    fn route_pending_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.update_rx.try_recv() {
            self.store.apply(update);
            applied += 1;
        }
        applied
    }
}

impl Drop for PcgMonitor {
    fn drop(&mut self) {
        let _ = self.command_tx.send(MonitorCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct MonitorWorker {
    refresh_rate_hz: f64,
    original: Phonocardiogram,
    components: Option<Components>,
    dirty: bool,
    dropped: usize,
}

struct Components {
    maternal: Phonocardiogram,
    fetal: Phonocardiogram,
    maternal_window: usize,
    fetal_cutoff_hz: f64,
}

impl Components {
    fn derive_from(&mut self, original: &Phonocardiogram) -> crate::error::Result<()> {
        let waveform = original.waveform();
        self.maternal
            .replace_waveform(maternal_heart_sound(waveform, self.maternal_window)?);
        self.fetal
            .replace_waveform(fetal_heart_sound(waveform, self.fetal_cutoff_hz)?);
        self.maternal.set_replay(original.is_replay());
        self.fetal.set_replay(original.is_replay());
        Ok(())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Phonocardiogram> {
        [&mut self.maternal, &mut self.fetal].into_iter()
    }
}

impl MonitorWorker {
    fn new(options: &PcgOptions) -> crate::error::Result<Self> {
        let original = Phonocardiogram::new(SoundKind::Original, options.clone())?;
        let components = if options.separation.enabled {
            Some(Components {
                maternal: Phonocardiogram::new(SoundKind::Maternal, options.clone())?,
                fetal: Phonocardiogram::new(SoundKind::Fetal, options.clone())?,
                maternal_window: options.separation.maternal_window,
                fetal_cutoff_hz: options.separation.fetal_cutoff_hz,
            })
        } else {
            None
        };
        Ok(Self {
            refresh_rate_hz: options.refresh_rate_hz,
            original,
            components,
            dirty: false,
            dropped: 0,
        })
    }

    fn run(
        mut self,
        command_rx: Receiver<MonitorCommand>,
        update_tx: Sender<MonitorUpdate>,
        cancel: Arc<AtomicBool>,
    ) {
        let compute = tick(Duration::from_secs_f64(1.0 / self.refresh_rate_hz));
        let indices = tick(INDICES_PERIOD);
        info!(
            "monitor started: compute at {} Hz, separation {}",
            self.refresh_rate_hz,
            if self.components.is_some() { "on" } else { "off" }
        );
        loop {
            select! {
                recv(command_rx) -> command => match command {
                    Ok(MonitorCommand::Ingest(samples)) => self.ingest(&samples),
                    Ok(MonitorCommand::LoadRecording(samples)) => self.load_recording(samples),
                    Ok(MonitorCommand::Reset) => self.reset(),
                    Ok(MonitorCommand::Shutdown) | Err(_) => break,
                },
                recv(compute) -> _ => {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    self.compute(&update_tx);
                }
                recv(indices) -> _ => {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    self.refresh_indices(&update_tx);
                }
            }
        }
        info!("monitor stopped");
    }

    fn ingest(&mut self, samples: &[f64]) {
        if samples.is_empty() {
            return;
        }
        let removed = self.original.ingest(samples);
        if removed > 0 {
            debug!("rolling window dropped {removed} samples");
        }
        self.dirty = true;
    }

    fn load_recording(&mut self, samples: Vec<f64>) {
        info!("loaded recording of {} samples", samples.len());
        self.original.load_recording(samples);
        if let Some(components) = self.components.as_mut() {
            components.iter_mut().for_each(Phonocardiogram::reset);
        }
        self.dirty = true;
    }

    fn reset(&mut self) {
        info!("monitor reset");
        self.original.reset();
        if let Some(components) = self.components.as_mut() {
            components.iter_mut().for_each(Phonocardiogram::reset);
        }
        self.dirty = true;
    }

    fn compute(&mut self, update_tx: &Sender<MonitorUpdate>) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        self.original.run_pass();
        let snapshot = self.original.snapshot();
        self.publish(update_tx, MonitorUpdate::Snapshot(Arc::new(snapshot)));

        let Some(components) = self.components.as_mut() else {
            return;
        };
        if let Err(err) = components.derive_from(&self.original) {
            warn!("component separation failed: {err}");
            return;
        }
        let mut snapshots = Vec::with_capacity(2);
        for pcg in components.iter_mut() {
            pcg.run_pass();
            snapshots.push(pcg.snapshot());
        }
        for snapshot in snapshots {
            self.publish(update_tx, MonitorUpdate::Snapshot(Arc::new(snapshot)));
        }
    }

    fn refresh_indices(&mut self, update_tx: &Sender<MonitorUpdate>) {
        let mut reports = vec![(SoundKind::Original, self.original.refresh_indices().clone())];
        if let Some(components) = self.components.as_mut() {
            for pcg in components.iter_mut() {
                reports.push((pcg.kind(), pcg.refresh_indices().clone()));
            }
        }
        for (kind, report) in reports {
            self.publish(update_tx, MonitorUpdate::Indices(kind, report));
        }
    }

    fn publish(&mut self, update_tx: &Sender<MonitorUpdate>, update: MonitorUpdate) {
        match update_tx.try_send(update) {
            Ok(()) => {
                if self.dropped > 0 {
                    debug!("reader caught up after {} dropped updates", self.dropped);
                    self.dropped = 0;
                }
            }
            Err(TrySendError::Full(_)) => {
                if self.dropped == 0 {
                    warn!("update channel full, dropping updates until the reader polls");
                }
                self.dropped += 1;
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SyntheticRecording;
    use std::time::Instant;

    fn options() -> PcgOptions {
        let mut opts = PcgOptions::for_waveform_rate(250.0);
        opts.refresh_rate_hz = 100.0;
        opts
    }

    fn wait_for<F>(monitor: &mut PcgMonitor, mut done: F) -> bool
    where
        F: FnMut(&SnapshotStore) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            monitor.poll();
            if done(monitor.store()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn replayed_recording_is_published_with_indices() {
        let rec = SyntheticRecording::default();
        let mut monitor = PcgMonitor::spawn(options()).unwrap();
        monitor.load_recording(rec.generate(0).data).unwrap();
        let expected = rec.beat_times().len();
        assert!(wait_for(&mut monitor, |store| {
            store.original().is_some_and(|snap| snap.beats.len() == expected)
        }));
        let snap = monitor.snapshot(SoundKind::Original).unwrap();
        assert!(snap.replay);
        assert!(snap.hrv.is_available());
        assert!(monitor.snapshot(SoundKind::Fetal).is_none());
    }

    #[test]
    fn live_samples_from_another_thread() {
        let ts = SyntheticRecording::default().generate(1);
        let mut monitor = PcgMonitor::spawn(options()).unwrap();
        let tx = monitor.command_sender();
        let producer = std::thread::spawn(move || {
            for chunk in ts.as_slice().chunks(250) {
                tx.send(MonitorCommand::Ingest(chunk.to_vec())).unwrap();
            }
        });
        producer.join().unwrap();
        assert!(wait_for(&mut monitor, |store| {
            store.hrv(SoundKind::Original).is_some_and(HrvReport::is_available)
        }));
        let snap = monitor.snapshot(SoundKind::Original).unwrap();
        assert!(!snap.replay);
        assert!(snap.beats.len() > 2);
    }

    #[test]
    fn separation_publishes_components() {
        let mut opts = options();
        opts.separation.enabled = true;
        let mut monitor = PcgMonitor::spawn(opts).unwrap();
        monitor
            .load_recording(SyntheticRecording::default().generate(2).data)
            .unwrap();
        assert!(wait_for(&mut monitor, |store| {
            store.get(SoundKind::Maternal).is_some() && store.get(SoundKind::Fetal).is_some()
        }));
        let original = monitor.snapshot(SoundKind::Original).unwrap();
        let maternal = monitor.snapshot(SoundKind::Maternal).unwrap();
        assert_eq!(maternal.waveform.len(), original.waveform.len());
    }

    #[test]
    fn reset_clears_published_state() {
        let mut monitor = PcgMonitor::spawn(options()).unwrap();
        monitor
            .load_recording(SyntheticRecording::default().generate(3).data)
            .unwrap();
        assert!(wait_for(&mut monitor, |store| {
            store.original().is_some_and(|snap| !snap.beats.is_empty())
        }));
        monitor.reset().unwrap();
        assert!(wait_for(&mut monitor, |store| {
            store.original().is_some_and(|snap| snap.waveform.is_empty())
        }));
    }

    #[test]
    fn cancel_stops_worker() {
        let monitor = PcgMonitor::spawn(options()).unwrap();
        monitor.cancel();
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!monitor.is_running());
        assert!(monitor.ingest(vec![0.0]).is_err());
    }

    #[test]
    fn invalid_options_fail_to_spawn() {
        let mut opts = options();
        opts.refresh_rate_hz = 0.0;
        assert!(PcgMonitor::spawn(opts).is_err());
    }
}
