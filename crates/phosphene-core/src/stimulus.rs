//! Stimulus model: per-electrode current waveforms and pulse trains.
//!
//! Amplitudes are in microamperes and follow the effective-current
//! convention: positive values are cathodic (depolarising), negative values
//! anodic. Times are in seconds.
//!
//! ## Resampling policy
//!
//! The orchestrator places every waveform on one uniform [`TimeBase`]. A
//! target time that coincides with an original sample (to within a millionth
//! of the step) takes that sample's value exactly. A target time between two
//! samples is linearly interpolated, and each call that interpolates logs a
//! warning. Times outside the waveform's range read as zero current. A step
//! coarser than the waveform's narrowest feature is rejected, since it could
//! skip a whole phase.

use std::collections::BTreeMap;

use ndarray::Array2;
use phosphene_geometry::ElectrodeArray;
use serde::{Deserialize, Serialize};

use crate::error::{SamplingError, SimulationError};

/// A uniform sequence of sample times `start + i * step`, `i < len`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    pub start: f64,
    pub step: f64,
    pub len: usize,
}

impl TimeBase {
    /// The smallest time base starting at `start` whose last sample is at or
    /// beyond `end` (to within rounding).
    pub fn covering(start: f64, end: f64, step: f64) -> Result<Self, SimulationError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(SimulationError::config(format!(
                "time step must be positive, got {}",
                step
            )));
        }
        if !(start.is_finite() && end.is_finite()) {
            return Err(SimulationError::config("time range is not finite"));
        }
        let span = (end - start).max(0.0);
        let intervals = (span / step - 1e-9).ceil().max(0.0) as usize;
        Ok(Self {
            start,
            step,
            len: intervals + 1,
        })
    }

    pub fn time(&self, i: usize) -> f64 {
        self.start + i as f64 * self.step
    }

    /// Time of the last sample.
    pub fn end(&self) -> f64 {
        self.time(self.len.saturating_sub(1))
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |i| self.time(i))
    }
}

/// Current samples for one electrode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
    times: Vec<f64>,
    amplitudes: Vec<f64>,
    /// Shortest feature (s) the waveform must keep when resampled.
    feature_width: f64,
}

impl Waveform {
    /// Build a waveform from `(time, amplitude)` samples.
    ///
    /// Times must be finite and strictly increasing. The feature width is the
    /// shortest interval between consecutive samples.
    pub fn from_samples(samples: Vec<(f64, f64)>) -> Result<Self, SimulationError> {
        if samples.is_empty() {
            return Err(SimulationError::config("waveform has no samples"));
        }
        let mut feature_width = f64::INFINITY;
        for (i, &(t, a)) in samples.iter().enumerate() {
            if !(t.is_finite() && a.is_finite()) {
                return Err(SimulationError::config(format!(
                    "waveform sample {} ({}, {}) is not finite",
                    i, t, a
                )));
            }
            if i > 0 {
                let dt = t - samples[i - 1].0;
                if dt <= 0.0 {
                    return Err(SimulationError::config(format!(
                        "waveform times must be strictly increasing (sample {} at {} s)",
                        i, t
                    )));
                }
                feature_width = feature_width.min(dt);
            }
        }
        let (times, amplitudes) = samples.into_iter().unzip();
        Ok(Self {
            times,
            amplitudes,
            feature_width,
        })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    pub fn feature_width(&self) -> f64 {
        self.feature_width
    }

    pub fn start(&self) -> f64 {
        self.times[0]
    }

    pub fn end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn is_silent(&self) -> bool {
        self.amplitudes.iter().all(|&a| a == 0.0)
    }

    /// The same waveform with every amplitude multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            times: self.times.clone(),
            amplitudes: self.amplitudes.iter().map(|a| a * factor).collect(),
            feature_width: self.feature_width,
        }
    }

    /// Sample the waveform on `base`. See the module docs for the policy.
    pub fn resample(&self, base: &TimeBase) -> Result<Vec<f64>, SamplingError> {
        if base.step > self.feature_width * (1.0 + 1e-9) {
            return Err(SamplingError {
                requested_step: base.step,
                feature_width: self.feature_width,
            });
        }

        let snap = base.step * 1e-6;
        let (first, last) = (self.start(), self.end());
        let mut interpolated = 0usize;
        let out = base
            .times()
            .map(|t| {
                if t < first - snap || t > last + snap {
                    return 0.0;
                }
                // First sample strictly after t.
                let hi = self.times.partition_point(|&s| s <= t);
                if hi > 0 && t - self.times[hi - 1] <= snap {
                    return self.amplitudes[hi - 1];
                }
                if hi < self.times.len() && self.times[hi] - t <= snap {
                    return self.amplitudes[hi];
                }
                // first - snap <= t < first was handled above, so hi >= 1 here.
                let lo = hi - 1;
                let frac = (t - self.times[lo]) / (self.times[hi] - self.times[lo]);
                interpolated += 1;
                self.amplitudes[lo] + frac * (self.amplitudes[hi] - self.amplitudes[lo])
            })
            .collect();

        if interpolated > 0 {
            log::warn!(
                "Resampling interpolated {} of {} points between original samples",
                interpolated,
                base.len
            );
        }
        Ok(out)
    }
}

/// Phase order of a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Cathodic phase, optional gap, then anodic phase.
    #[default]
    CathodicFirst,
    AnodicFirst,
    /// A single cathodic phase.
    Monophasic,
}

/// A train of rectangular current pulses on one electrode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseTrain {
    /// Phase amplitude (µA).
    pub amplitude: f64,
    /// Duration of each phase (s).
    pub phase_duration: f64,
    /// Pulse repetition rate (Hz).
    pub frequency: f64,
    /// Length of the train (s).
    pub duration: f64,
    /// Onset of the first pulse (s).
    pub delay: f64,
    /// Zero-current gap between the two phases of a biphasic pulse (s).
    pub interphase_gap: f64,
    pub polarity: Polarity,
}

impl Default for PulseTrain {
    fn default() -> Self {
        Self {
            amplitude: 20.0,
            phase_duration: 0.45e-3,
            frequency: 20.0,
            duration: 0.5,
            delay: 0.0,
            interphase_gap: 0.0,
            polarity: Polarity::CathodicFirst,
        }
    }
}

impl PulseTrain {
    fn validate(&self, dt: f64) -> Result<(), SimulationError> {
        let positive = [
            ("time step", dt),
            ("phase_duration", self.phase_duration),
            ("frequency", self.frequency),
            ("duration", self.duration),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(SimulationError::config(format!(
                    "pulse train {} must be positive, got {}",
                    name, v
                )));
            }
        }
        for (name, v) in [("delay", self.delay), ("interphase_gap", self.interphase_gap)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(SimulationError::config(format!(
                    "pulse train {} must be non-negative, got {}",
                    name, v
                )));
            }
        }
        if !self.amplitude.is_finite() {
            return Err(SimulationError::config("pulse train amplitude is not finite"));
        }
        if self.pulse_width() > 1.0 / self.frequency {
            return Err(SimulationError::config(format!(
                "pulses of {:.3e} s overlap at {} Hz",
                self.pulse_width(),
                self.frequency
            )));
        }
        Ok(())
    }

    /// Time from the onset of a pulse to the end of its last phase (s).
    pub fn pulse_width(&self) -> f64 {
        match self.polarity {
            Polarity::Monophasic => self.phase_duration,
            _ => 2.0 * self.phase_duration + self.interphase_gap,
        }
    }

    /// Sample the train every `dt` seconds from `delay` to `delay + duration`.
    ///
    /// Fails with `Sampling` when `dt` is coarser than a phase or the gap.
    pub fn render(&self, dt: f64) -> Result<Waveform, SimulationError> {
        self.validate(dt)?;
        let mut feature_width = self.phase_duration;
        if self.interphase_gap > 0.0 && self.polarity != Polarity::Monophasic {
            feature_width = feature_width.min(self.interphase_gap);
        }
        if dt > feature_width * (1.0 + 1e-9) {
            return Err(SimulationError::Sampling {
                electrode: String::new(),
                source: SamplingError {
                    requested_step: dt,
                    feature_width,
                },
            });
        }

        let (first, second) = match self.polarity {
            Polarity::CathodicFirst => (self.amplitude, -self.amplitude),
            Polarity::AnodicFirst => (-self.amplitude, self.amplitude),
            Polarity::Monophasic => (self.amplitude, 0.0),
        };
        let period = 1.0 / self.frequency;
        let pd = self.phase_duration;
        let second_start = pd + self.interphase_gap;
        let eps = dt * 1e-6;

        let n = (self.duration / dt + 1e-9).floor() as usize + 1;
        let mut times = Vec::with_capacity(n);
        let mut amplitudes = Vec::with_capacity(n);
        for k in 0..n {
            let local = k as f64 * dt;
            let offset = local - ((local + eps) / period).floor() * period;
            let value = if offset < pd - eps {
                first
            } else if offset >= second_start - eps && offset < second_start + pd - eps {
                second
            } else {
                0.0
            };
            times.push(self.delay + local);
            amplitudes.push(value);
        }

        Ok(Waveform {
            times,
            amplitudes,
            feature_width,
        })
    }
}

/// The full stimulus: one waveform per electrode id, in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stimulus {
    waveforms: BTreeMap<String, Waveform>,
}

impl Stimulus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a waveform to `electrode`, returning the one it replaces.
    pub fn insert(&mut self, electrode: impl Into<String>, waveform: Waveform) -> Option<Waveform> {
        self.waveforms.insert(electrode.into(), waveform)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, electrode: impl Into<String>, waveform: Waveform) -> Self {
        self.insert(electrode, waveform);
        self
    }

    /// Render each pulse train at resolution `dt`.
    pub fn from_pulse_trains<I, S>(trains: I, dt: f64) -> Result<Self, SimulationError>
    where
        I: IntoIterator<Item = (S, PulseTrain)>,
        S: Into<String>,
    {
        let mut stimulus = Self::new();
        for (id, train) in trains {
            let id = id.into();
            let waveform = train.render(dt).map_err(|e| match e {
                SimulationError::Sampling { source, .. } => SimulationError::Sampling {
                    electrode: id.clone(),
                    source,
                },
                other => other,
            })?;
            stimulus.insert(id, waveform);
        }
        Ok(stimulus)
    }

    pub fn get(&self, electrode: &str) -> Option<&Waveform> {
        self.waveforms.get(electrode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Waveform)> {
        self.waveforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn electrode_ids(&self) -> impl Iterator<Item = &str> {
        self.waveforms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }

    /// Union of all waveform time ranges, or `None` for an empty stimulus.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.waveforms.values().fold(None, |acc, w| match acc {
            None => Some((w.start(), w.end())),
            Some((lo, hi)) => Some((lo.min(w.start()), hi.max(w.end()))),
        })
    }

    /// Every amplitude multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            waveforms: self
                .waveforms
                .iter()
                .map(|(k, w)| (k.clone(), w.scaled(factor)))
                .collect(),
        }
    }

    /// True when no electrode carries any current.
    pub fn is_silent(&self) -> bool {
        self.waveforms.values().all(Waveform::is_silent)
    }
}

/// The stimulus placed on a shared time base, one row per stimulated electrode.
#[derive(Debug, Clone)]
pub struct StimulusMatrix {
    time_base: TimeBase,
    /// Index into the electrode array for each row, ascending.
    electrodes: Vec<usize>,
    values: Array2<f64>,
}

impl StimulusMatrix {
    /// Check ids against `array` and resample every waveform onto `time_base`.
    ///
    /// Rows follow the array's electrode order, so accumulation over rows is
    /// independent of the stimulus map's key order.
    pub fn assemble(
        stimulus: &Stimulus,
        array: &ElectrodeArray,
        time_base: TimeBase,
    ) -> Result<Self, SimulationError> {
        let mut rows: Vec<(usize, &Waveform, &str)> = Vec::with_capacity(stimulus.len());
        for (id, waveform) in stimulus.iter() {
            let index = array
                .index_of(id)
                .ok_or_else(|| SimulationError::UnknownElectrode(id.to_string()))?;
            rows.push((index, waveform, id));
        }
        rows.sort_by_key(|&(index, _, _)| index);

        let mut values = Array2::zeros((rows.len(), time_base.len));
        for (r, &(_, waveform, id)) in rows.iter().enumerate() {
            let samples = waveform
                .resample(&time_base)
                .map_err(|source| SimulationError::Sampling {
                    electrode: id.to_string(),
                    source,
                })?;
            values
                .row_mut(r)
                .iter_mut()
                .zip(samples)
                .for_each(|(v, s)| *v = s);
        }

        Ok(Self {
            time_base,
            electrodes: rows.into_iter().map(|(index, _, _)| index).collect(),
            values,
        })
    }

    pub fn time_base(&self) -> &TimeBase {
        &self.time_base
    }

    /// Electrode-array index of each row.
    pub fn electrodes(&self) -> &[usize] {
        &self.electrodes
    }

    /// `(stimulated electrodes × time samples)` currents (µA).
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn is_silent(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }
}
