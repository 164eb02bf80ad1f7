//! Genome-backed neural controllers.
//!
//! [`MlpBrain`] is a single-hidden-layer perceptron whose weights come
//! straight from the agent's genome, so evolution operates on flat weight
//! vectors without knowing anything about network shape.

use bugworld_core::population::Genome;
use bugworld_core::{Brain, BrainFactory, SensorFrame, INPUT_SIZE, OUTPUT_SIZE};
use tracing::warn;

/// Flat weight layout per hidden size `h`:
/// input-to-hidden (`h * INPUT_SIZE`), hidden biases (`h`),
/// hidden-to-output (`OUTPUT_SIZE * h`), output biases (`OUTPUT_SIZE`).
fn hidden_size_for(weight_count: usize) -> Option<usize> {
    // solve h from: h * (INPUT_SIZE + OUTPUT_SIZE + 1) + OUTPUT_SIZE = n
    let per_hidden = INPUT_SIZE + OUTPUT_SIZE + 1;
    let remainder = weight_count.checked_sub(OUTPUT_SIZE)?;
    if remainder == 0 || remainder % per_hidden != 0 {
        return None;
    }
    Some(remainder / per_hidden)
}

/// Single-hidden-layer tanh perceptron over the standard sensor inputs.
pub struct MlpBrain {
    hidden: usize,
    weights: Vec<f32>,
    inputs: [f32; INPUT_SIZE],
}

impl MlpBrain {
    /// Build from a genome, inferring the hidden-layer size from the weight
    /// vector length. Malformed lengths yield `None`.
    #[must_use]
    pub fn from_genome(genome: &Genome) -> Option<Self> {
        let hidden = hidden_size_for(genome.weights.len())?;
        Some(Self {
            hidden,
            weights: genome.weights.clone(),
            inputs: [0.0; INPUT_SIZE],
        })
    }

    #[must_use]
    pub fn hidden_size(&self) -> usize {
        self.hidden
    }

    fn weight(&self, index: usize) -> f32 {
        self.weights.get(index).copied().unwrap_or(0.0)
    }

    fn forward(&self) -> [f32; OUTPUT_SIZE] {
        let h = self.hidden;
        let hidden_bias_base = h * INPUT_SIZE;
        let output_weight_base = hidden_bias_base + h;
        let output_bias_base = output_weight_base + OUTPUT_SIZE * h;

        let mut activations = vec![0.0_f32; h];
        for (neuron, activation) in activations.iter_mut().enumerate() {
            let mut sum = self.weight(hidden_bias_base + neuron);
            for (input_idx, &input) in self.inputs.iter().enumerate() {
                sum += self.weight(neuron * INPUT_SIZE + input_idx) * input;
            }
            *activation = sum.tanh();
        }

        let mut outputs = [0.0_f32; OUTPUT_SIZE];
        for (out_idx, output) in outputs.iter_mut().enumerate() {
            let mut sum = self.weight(output_bias_base + out_idx);
            for (neuron, &activation) in activations.iter().enumerate() {
                sum += self.weight(output_weight_base + out_idx * h + neuron) * activation;
            }
            *output = sum.tanh();
        }
        outputs
    }
}

impl std::fmt::Debug for MlpBrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlpBrain")
            .field("hidden", &self.hidden)
            .field("weights", &self.weights.len())
            .finish()
    }
}

impl Brain for MlpBrain {
    fn kind(&self) -> &'static str {
        "mlp"
    }

    fn observe(&mut self, frame: &SensorFrame) {
        self.inputs = frame.to_inputs();
    }

    fn decide(&mut self) -> (f32, f32) {
        let outputs = self.forward();
        (outputs[0], outputs[1])
    }
}

/// Builds an [`MlpBrain`] per agent. Genomes with a malformed weight count
/// fall back to an inert zero-weight network rather than failing the spawn.
#[derive(Debug, Default, Clone, Copy)]
pub struct MlpBrainFactory;

impl BrainFactory for MlpBrainFactory {
    fn build(&self, genome: &Genome) -> Box<dyn Brain> {
        match MlpBrain::from_genome(genome) {
            Some(brain) => Box::new(brain),
            None => {
                warn!(
                    key = genome.key,
                    weights = genome.weights.len(),
                    "genome weight count does not fit any network shape"
                );
                Box::new(MlpBrain {
                    hidden: 1,
                    weights: Vec::new(),
                    inputs: [0.0; INPUT_SIZE],
                })
            }
        }
    }
}
