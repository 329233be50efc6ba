//! Blend layer: combine per-layer vectors into one.

use rustc_hash::FxHashMap;

use crate::vector::{project, Vector};

/// How layers are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMethod {
    /// Per-layer scalar weights over projected vectors.
    Weighted,
    /// Concatenate, then project down.
    Concat,
    /// Weights proportional to L2 norm times static weight, renormalized.
    Attention,
}

impl BlendMethod {
    pub fn parse(s: &str) -> Self {
        match s {
            "concat" => Self::Concat,
            "attention" => Self::Attention,
            _ => Self::Weighted,
        }
    }
}

/// Combines named layer vectors into a final vector of `output_dims`.
pub struct Blender {
    output_dims: usize,
    method: BlendMethod,
    weights: FxHashMap<String, f32>,
    normalize: bool,
}

impl Blender {
    pub fn new(output_dims: usize, method: BlendMethod) -> Self {
        Self {
            output_dims,
            method,
            weights: FxHashMap::default(),
            normalize: true,
        }
    }

    pub fn with_weight(mut self, layer: &str, weight: f32) -> Self {
        self.weights.insert(layer.to_string(), weight);
        self
    }

    pub fn with_weights(mut self, weights: &FxHashMap<String, f32>) -> Self {
        for (k, v) in weights {
            self.weights.insert(k.clone(), *v);
        }
        self
    }

    pub fn raw(mut self) -> Self {
        self.normalize = false;
        self
    }

    pub fn output_dims(&self) -> usize {
        self.output_dims
    }

    fn weight_of(&self, layer: &str, layer_count: usize) -> f32 {
        self.weights
            .get(layer)
            .copied()
            .unwrap_or(1.0 / layer_count.max(1) as f32)
    }

    /// Blend the given (layer name, vector) pairs. Order of `layers`
    /// determines concat order; weighted and attention are order-free.
    pub fn blend(&self, layers: &[(&str, &Vector)]) -> Vector {
        let mut out = match self.method {
            BlendMethod::Weighted => self.blend_weighted(layers),
            BlendMethod::Concat => self.blend_concat(layers),
            BlendMethod::Attention => self.blend_attention(layers),
        };
        if self.normalize {
            out.normalize();
        }
        out
    }

    fn blend_weighted(&self, layers: &[(&str, &Vector)]) -> Vector {
        let mut out = vec![0.0f32; self.output_dims];
        for (name, vec) in layers {
            let weight = self.weight_of(name, layers.len());
            let projected = project(vec.as_slice(), self.output_dims);
            for (slot, v) in out.iter_mut().zip(projected) {
                *slot += v * weight;
            }
        }
        Vector(out)
    }

    fn blend_concat(&self, layers: &[(&str, &Vector)]) -> Vector {
        let total: usize = layers.iter().map(|(_, v)| v.len()).sum();
        let mut concat = Vec::with_capacity(total);
        for (_, vec) in layers {
            concat.extend_from_slice(vec.as_slice());
        }
        Vector(project(&concat, self.output_dims))
    }

    fn blend_attention(&self, layers: &[(&str, &Vector)]) -> Vector {
        let mut scores: Vec<f32> = layers
            .iter()
            .map(|(name, vec)| vec.norm() * self.weight_of(name, layers.len()))
            .collect();
        let total: f32 = scores.iter().sum();
        if total > 0.0 {
            for s in &mut scores {
                *s /= total;
            }
        }
        let mut out = vec![0.0f32; self.output_dims];
        for ((_, vec), score) in layers.iter().zip(scores) {
            let projected = project(vec.as_slice(), self.output_dims);
            for (slot, v) in out.iter_mut().zip(projected) {
                *slot += v * score;
            }
        }
        Vector(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Vector {
        let mut v = Vector(values.to_vec());
        v.normalize();
        v
    }

    #[test]
    fn weighted_blend_is_unit_norm() {
        let a = unit(&[1.0, 0.0, 0.0, 0.0]);
        let b = unit(&[0.0, 1.0]);
        let blender = Blender::new(4, BlendMethod::Weighted)
            .with_weight("structure", 0.7)
            .with_weight("lexical", 0.3);
        let out = blender.blend(&[("structure", &a), ("lexical", &b)]);
        assert_eq!(out.len(), 4);
        assert!((out.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shorter_layer_contributes_via_zero_padding() {
        let a = unit(&[0.0, 0.0, 0.0, 1.0]);
        let b = unit(&[1.0]);
        let blender = Blender::new(4, BlendMethod::Weighted)
            .with_weight("structure", 0.5)
            .with_weight("lexical", 0.5);
        let out = blender.blend(&[("structure", &a), ("lexical", &b)]);
        // Lexical lands only in slot 0, structure only in slot 3.
        assert!(out.0[0] > 0.0);
        assert!(out.0[3] > 0.0);
        assert_eq!(out.0[1], 0.0);
    }

    #[test]
    fn concat_projects_to_output_dims() {
        let a = unit(&[1.0, 2.0, 3.0, 4.0]);
        let b = unit(&[5.0, 6.0, 7.0, 8.0]);
        let blender = Blender::new(4, BlendMethod::Concat);
        let out = blender.blend(&[("structure", &a), ("lexical", &b)]);
        assert_eq!(out.len(), 4);
        assert!((out.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn attention_prefers_high_energy_layer() {
        let strong = Vector(vec![2.0, 0.0]);
        let weak = Vector(vec![0.0, 0.1]);
        let blender = Blender::new(2, BlendMethod::Attention)
            .with_weight("a", 0.5)
            .with_weight("b", 0.5)
            .raw();
        let out = blender.blend(&[("a", &strong), ("b", &weak)]);
        assert!(out.0[0] > out.0[1] * 10.0);
    }

    #[test]
    fn missing_weight_falls_back_to_uniform() {
        let a = unit(&[1.0, 0.0]);
        let blender = Blender::new(2, BlendMethod::Weighted);
        let out = blender.blend(&[("only", &a)]);
        assert!(out.0[0] > 0.0);
    }

    #[test]
    fn method_parse() {
        assert_eq!(BlendMethod::parse("concat"), BlendMethod::Concat);
        assert_eq!(BlendMethod::parse("attention"), BlendMethod::Attention);
        assert_eq!(BlendMethod::parse("weighted"), BlendMethod::Weighted);
        assert_eq!(BlendMethod::parse(""), BlendMethod::Weighted);
    }
}
