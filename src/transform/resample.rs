use crate::av::{ChannelLayout, Frame, FrameFormat, Rational, SampleFormat, DEFAULT_ALIGN};
use crate::{AvError, Result};
use std::fmt;

/// Rate, sample format and channel layout of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Samples per second
    pub sample_rate: u32,
    /// Sample encoding
    pub format: SampleFormat,
    /// Channel arrangement
    pub layout: ChannelLayout,
}

impl AudioSpec {
    /// Builds a spec from its parts.
    pub fn new(sample_rate: u32, format: SampleFormat, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            format,
            layout,
        }
    }

    /// Spec of an audio frame, allocated or a template.
    pub fn of(frame: &Frame) -> Option<Self> {
        match frame.format()? {
            FrameFormat::Audio {
                sample_rate,
                format,
                layout,
                ..
            } => Some(Self::new(sample_rate, format, layout)),
            FrameFormat::Video { .. } => None,
        }
    }

    /// An empty frame describing this spec, to be used as a destination.
    pub fn template(&self) -> Frame {
        Frame::audio_template(self.sample_rate, self.format, self.layout)
    }

    fn channels(&self) -> usize {
        self.layout.channels() as usize
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz {} {}", self.sample_rate, self.format, self.layout)
    }
}

fn read_sample(bytes: &[u8], format: SampleFormat) -> f64 {
    match format.packed() {
        SampleFormat::U8 => (f64::from(bytes[0]) - 128.0) / 128.0,
        SampleFormat::S16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32768.0,
        SampleFormat::S32 => {
            f64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])) / 2_147_483_648.0
        }
        SampleFormat::F32 => f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            f64::from_le_bytes(raw)
        }
    }
}

fn write_sample(out: &mut [u8], format: SampleFormat, value: f64) {
    match format.packed() {
        SampleFormat::U8 => out[0] = (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8,
        SampleFormat::S16 => {
            let v = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::S32 => {
            let v = (value * 2_147_483_648.0)
                .round()
                .clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
            out.copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::F32 => out.copy_from_slice(&(value as f32).to_le_bytes()),
        _ => out.copy_from_slice(&value.to_le_bytes()),
    }
}

/// Streaming sample rate, sample format and channel layout converter.
///
/// The input spec is taken from the first frame and the output spec from the
/// destination frame (see [`AudioSpec::template`]). Either may change only
/// while nothing is buffered, that is before the first frame or after
/// [`flush`](Self::flush) or [`reset`](Self::reset).
///
/// Rates are converted by linear interpolation. Positions are tracked as
/// exact integer fractions, so the output does not depend on how the input
/// is split into frames. Fewer output channels are mixed by averaging the
/// input channels that fold onto them; more are filled by repetition.
#[derive(Debug, Default)]
pub struct Resampler {
    input: Option<AudioSpec>,
    output: Option<AudioSpec>,
    /// Channel-mapped input samples, interleaved in output channel order
    buffer: Vec<f64>,
    /// Position of the next output sample in the buffer, in units of
    /// 1/output_rate input samples
    position: u64,
    next_pts: Option<i64>,
    scratch: Vec<f64>,
    mixed: Vec<f64>,
}

impl Resampler {
    /// A resampler without specs; both are bound by the first conversion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Input spec, once the first frame was seen.
    pub fn input(&self) -> Option<AudioSpec> {
        self.input
    }

    /// Output spec, once the first destination was seen.
    pub fn output(&self) -> Option<AudioSpec> {
        self.output
    }

    /// Converts `src` and writes every output sample that can be computed so
    /// far into `dst`. Returns the number of samples per channel written.
    pub fn convert(&mut self, src: &Frame, dst: &mut Frame) -> Result<usize> {
        let input = AudioSpec::of(src)
            .filter(|_| src.is_allocated())
            .ok_or_else(|| AvError::contract("resampler input must be an allocated audio frame"))?;
        let output = self.bind_output(dst)?;
        self.bind_input(input)?;

        if self.buffer.is_empty() && self.position == 0 && self.next_pts.is_none() {
            self.next_pts = src
                .pts
                .filter(|_| src.time_base.num != 0)
                .map(|pts| src.time_base.rescale(pts, Rational::new(1, output.sample_rate as i32)));
        }
        self.append(src, input, output)?;
        self.emit(output, false);
        self.store(output, dst)
    }

    /// Writes every remaining output sample into `dst`. Afterwards nothing
    /// is buffered and [`delay`](Self::delay) is 0.
    pub fn flush(&mut self, dst: &mut Frame) -> Result<usize> {
        let output = self.bind_output(dst)?;
        if self.input.is_some() {
            self.emit(output, true);
        } else {
            self.mixed.clear();
        }
        let written = self.store(output, dst)?;
        self.next_pts = None;
        Ok(written)
    }

    /// Buffered input, as a number of samples at `output_rate`, rounded up.
    pub fn delay(&self, output_rate: u32) -> usize {
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return 0;
        };
        let out_rate = u128::from(output.sample_rate);
        let remaining = (self.frames() as u128 * out_rate).saturating_sub(u128::from(self.position));
        let denominator = out_rate * u128::from(input.sample_rate);
        ((remaining * u128::from(output_rate) + denominator - 1) / denominator) as usize
    }

    /// Drops buffered samples and forgets both specs.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn frames(&self) -> usize {
        self.output
            .map(|o| self.buffer.len() / o.channels())
            .unwrap_or(0)
    }

    fn bind_input(&mut self, input: AudioSpec) -> Result<()> {
        if input.sample_rate == 0 || input.layout.channels() == 0 {
            return Err(AvError::contract(format!("invalid resampler input {input}")));
        }
        match self.input {
            Some(current) if current != input && self.frames() > 0 => Err(AvError::contract(
                format!("resampler input changed from {current} to {input} with samples buffered"),
            )),
            _ => {
                self.input = Some(input);
                Ok(())
            }
        }
    }

    fn bind_output(&mut self, dst: &Frame) -> Result<AudioSpec> {
        let output = AudioSpec::of(dst)
            .ok_or_else(|| AvError::contract("resampler destination must describe an audio format"))?;
        if output.sample_rate == 0 || output.layout.channels() == 0 {
            return Err(AvError::contract(format!("invalid resampler output {output}")));
        }
        match self.output {
            Some(current) if current != output && self.frames() > 0 => Err(AvError::contract(
                format!("resampler output changed from {current} to {output} with samples buffered"),
            )),
            _ => {
                self.output = Some(output);
                Ok(output)
            }
        }
    }

    /// Decodes `src` to floats and maps its channels onto the output layout.
    fn append(&mut self, src: &Frame, input: AudioSpec, output: AudioSpec) -> Result<()> {
        let (in_ch, out_ch) = (input.channels(), output.channels());
        let bytes = input.format.bytes_per_sample();
        let planar = input.format.is_planar();
        let planes = (0..if planar { in_ch } else { 1 })
            .map(|p| {
                src.row(p, 0)
                    .ok_or_else(|| AvError::contract(format!("input plane {p} is missing")))
            })
            .collect::<Result<Vec<_>>>()?;

        self.buffer.reserve(src.samples() * out_ch);
        for i in 0..src.samples() {
            self.scratch.clear();
            for c in 0..in_ch {
                let (plane, at) = if planar { (c, i * bytes) } else { (0, (i * in_ch + c) * bytes) };
                self.scratch.push(read_sample(&planes[plane][at..at + bytes], input.format));
            }
            for j in 0..out_ch {
                let value = if out_ch >= in_ch {
                    self.scratch[j % in_ch]
                } else {
                    let (sum, count) = self
                        .scratch
                        .iter()
                        .skip(j)
                        .step_by(out_ch)
                        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
                    sum / count as f64
                };
                self.buffer.push(value);
            }
        }
        Ok(())
    }

    /// Interpolates output samples into `mixed`. Without `flushing`, the
    /// last buffered input sample is kept until its successor arrives.
    fn emit(&mut self, output: AudioSpec, flushing: bool) {
        self.mixed.clear();
        let Some(input) = self.input else { return };
        let channels = output.channels();
        let frames = self.frames();
        let (in_rate, out_rate) = (u64::from(input.sample_rate), u64::from(output.sample_rate));
        let usable = if flushing { frames } else { frames.saturating_sub(1) };
        let limit = usable as u64 * out_rate;

        while self.position < limit {
            let first = (self.position / out_rate) as usize;
            let second = (first + 1).min(frames - 1);
            let frac = (self.position % out_rate) as f64 / out_rate as f64;
            for c in 0..channels {
                let a = self.buffer[first * channels + c];
                let b = self.buffer[second * channels + c];
                self.mixed.push(a + (b - a) * frac);
            }
            self.position += in_rate;
        }

        let consumed = ((self.position / out_rate) as usize).min(frames);
        self.buffer.drain(..consumed * channels);
        self.position -= consumed as u64 * out_rate;
        if flushing {
            self.buffer.clear();
            self.position = 0;
        }
    }

    /// Writes `mixed` into `dst` in the output sample format.
    fn store(&mut self, output: AudioSpec, dst: &mut Frame) -> Result<usize> {
        let channels = output.channels();
        let samples = self.mixed.len() / channels;
        dst.ensure_allocated(
            FrameFormat::audio(samples, output.sample_rate, output.format, output.layout),
            DEFAULT_ALIGN,
        )?;
        let bytes = output.format.bytes_per_sample();
        if output.format.is_planar() {
            for c in 0..channels {
                let plane = dst.row_mut(c, 0)?;
                for (i, out) in plane.chunks_exact_mut(bytes).enumerate() {
                    write_sample(out, output.format, self.mixed[i * channels + c]);
                }
            }
        } else {
            let plane = dst.row_mut(0, 0)?;
            for (out, &value) in plane.chunks_exact_mut(bytes).zip(&self.mixed) {
                write_sample(out, output.format, value);
            }
        }

        dst.pts = self.next_pts;
        dst.time_base = Rational::new(1, output.sample_rate as i32);
        dst.keyframe = true;
        if let Some(pts) = self.next_pts.as_mut() {
            *pts += samples as i64;
        }
        Ok(samples)
    }
}
