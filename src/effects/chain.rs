// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use super::effect::Effect;
use crate::audio::{is_silent, Frame};

/// An ordered list of effects processed in series. Effects are boxed so they
/// can move between threads without the audio thread allocating or freeing.
#[derive(Debug, Default)]
pub struct EffectChain {
    effects: Vec<Box<Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain that can hold `capacity` effects without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            effects: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Appends an effect. Returns the effect back if the chain is full, so the
    /// audio thread never grows the backing storage.
    pub fn push(&mut self, effect: Box<Effect>) -> Result<(), Box<Effect>> {
        if self.effects.len() == self.effects.capacity() {
            return Err(effect);
        }
        self.effects.push(effect);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<Effect>> {
        if index < self.effects.len() {
            Some(self.effects.remove(index))
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&Effect> {
        self.effects.get(index).map(|effect| effect.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Effect> {
        self.effects.get_mut(index).map(|effect| effect.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter().map(|effect| effect.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Effect> {
        self.effects.iter_mut().map(|effect| effect.as_mut())
    }

    /// Wakes every effect so the next period is processed.
    pub fn start_running(&mut self) {
        for effect in self.effects.iter_mut() {
            effect.start_running();
        }
    }

    /// Runs every effect in order on `frames`. Returns true if any effect is
    /// still running, so the owner can skip the chain while it is idle and the
    /// input stays silent.
    pub fn process(&mut self, frames: &mut [Frame]) -> bool {
        if self.effects.is_empty() {
            return false;
        }
        if !is_silent(frames) {
            self.start_running();
        }

        let mut more_effects = false;
        for effect in self.effects.iter_mut() {
            more_effects |= effect.process(frames);
        }
        more_effects
    }

    /// Removes every effect, handing each to `retire`.
    pub fn clear<F>(&mut self, mut retire: F)
    where
        F: FnMut(Box<Effect>),
    {
        for effect in self.effects.drain(..) {
            retire(effect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SILENCE;
    use crate::effects::effect::EffectContext;
    use crate::effects::gate::AutoQuitDecay;
    use crate::effects::native::Gain;

    fn context() -> EffectContext {
        EffectContext {
            sample_rate: 44100,
            frames_per_period: 64,
            keep_running: false,
        }
    }

    fn gain(gain: f32) -> Box<Effect> {
        Box::new(Effect::new(Box::new(Gain::new(gain)), context()))
    }

    #[test]
    fn test_effects_run_in_order() {
        let mut chain = EffectChain::with_capacity(2);
        chain.push(gain(0.5)).unwrap();
        chain.push(gain(3.0)).unwrap();
        assert!(chain.push(gain(1.0)).is_err());

        let mut frames = vec![[0.2, -0.2]; 64];
        assert!(chain.process(&mut frames));
        assert!((frames[0][0] - 0.3).abs() < 1e-6);
        assert!((frames[0][1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_chain_idles_and_wakes() {
        let mut chain = EffectChain::with_capacity(1);
        let mut effect = gain(1.0);
        effect.set_decay(AutoQuitDecay::Millis(0.0));
        chain.push(effect).unwrap();

        let mut silence = vec![SILENCE; 64];
        assert!(!chain.process(&mut silence));
        assert!(!chain.get(0).unwrap().is_running());

        let mut frames = vec![[0.5, 0.5]; 64];
        assert!(chain.process(&mut frames));
        assert!(chain.get(0).unwrap().is_running());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut chain = EffectChain::with_capacity(4);
        chain.push(gain(1.0)).unwrap();
        chain.push(gain(2.0)).unwrap();
        assert!(chain.remove(5).is_none());
        assert_eq!("gain", chain.remove(0).unwrap().name());
        assert_eq!(1, chain.len());

        let mut retired = 0;
        chain.clear(|_| retired += 1);
        assert_eq!(1, retired);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_empty_chain_reports_idle() {
        let mut chain = EffectChain::new();
        let mut frames = vec![[0.5, 0.5]; 8];
        assert!(!chain.process(&mut frames));
    }
}
