// Pause and volume decorators over a sample stream
// Both are mutated in place while the stream is attached, never re-decoded

use super::SampleStream;

/// Pause control. A paused stream emits silence and never drains.
pub struct Ctrl<S> {
    inner: S,
    pub paused: bool,
}

impl<S: SampleStream> Ctrl<S> {
    pub fn new(inner: S, paused: bool) -> Self {
        Self { inner, paused }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: SampleStream> SampleStream for Ctrl<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.paused {
            out.fill(0.0);
            return out.len();
        }
        self.inner.read(out)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Logarithmic volume: gain = base ^ volume, or silence when `silent` is set
pub struct Volume<S> {
    inner: S,
    pub base: f64,
    pub volume: f64,
    pub silent: bool,
}

impl<S: SampleStream> Volume<S> {
    pub fn new(inner: S, base: f64, volume: f64, silent: bool) -> Self {
        Self {
            inner,
            base,
            volume,
            silent,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Linear gain currently applied to samples
    pub fn gain(&self) -> f32 {
        if self.silent {
            0.0
        } else {
            self.base.powf(self.volume) as f32
        }
    }
}

impl<S: SampleStream> SampleStream for Volume<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let n = self.inner.read(out);
        let gain = self.gain();
        for sample in &mut out[..n] {
            *sample *= gain;
        }
        n
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
