//! Model checkpoints: vocabulary, topology, and weights in one bincode file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{CharModel, ModelConfig, Parameters};
use crate::data::Vocabulary;
use crate::error::{ChargenError, Result};

/// Everything needed to resume sampling from a trained model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Vocabulary symbols in code order.
    pub symbols: Vec<char>,

    pub config: ModelConfig,

    pub params: Parameters,
}

impl Checkpoint {
    pub fn new(vocab: &Vocabulary, model: &CharModel) -> Self {
        Self {
            symbols: vocab.symbols().to_vec(),
            config: model.config.clone(),
            params: model.params.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        tracing::info!("wrote {} byte checkpoint to {}", bytes.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Rebuild the vocabulary and model, checking they agree.
    pub fn into_parts(self) -> Result<(Vocabulary, CharModel)> {
        let vocab = Vocabulary::from_symbols(self.symbols)?;
        if vocab.len() != self.config.vocab_size {
            return Err(ChargenError::Checkpoint(format!(
                "checkpoint vocabulary holds {} symbols but the model expects {}",
                vocab.len(),
                self.config.vocab_size
            )));
        }
        let model = CharModel::from_parameters(self.config, self.params)?;
        Ok((vocab, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::Sampler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn fixture() -> (Vocabulary, CharModel) {
        let vocab = Vocabulary::from_text("to be or not to be").unwrap();
        let config = ModelConfig {
            vocab_size: vocab.len(),
            hidden_size: 6,
            n_layers: 2,
            dropout: 0.5,
        };
        let model = CharModel::new(config, &mut StdRng::seed_from_u64(21)).unwrap();
        (vocab, model)
    }

    #[test]
    fn test_save_load_on_disk() {
        let (vocab, model) = fixture();
        let dir = tempdir().unwrap();
        let path = dir.path().join("rnn.net");

        Checkpoint::new(&vocab, &model).save(&path).unwrap();
        let (vocab2, model2) = Checkpoint::load(&path).unwrap().into_parts().unwrap();

        assert_eq!(vocab, vocab2);
        assert_eq!(model.config, model2.config);

        // Same weights, same greedy continuation.
        let a = Sampler::new(&model, &vocab, Some(1)).unwrap();
        let b = Sampler::new(&model2, &vocab2, Some(1)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            a.sample("to", 25, &mut rng).unwrap(),
            b.sample("to", 25, &mut rng).unwrap()
        );
    }

    #[test]
    fn test_corrupt_bytes() {
        let err = Checkpoint::from_bytes(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ChargenError::Checkpoint(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = Checkpoint::load(&dir.path().join("absent.net")).unwrap_err();
        assert!(matches!(err, ChargenError::Io(_)));
    }

    #[test]
    fn test_mismatched_vocabulary() {
        let (vocab, model) = fixture();
        let mut checkpoint = Checkpoint::new(&vocab, &model);
        checkpoint.symbols.pop();
        assert!(matches!(
            checkpoint.into_parts(),
            Err(ChargenError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_mismatched_shapes() {
        let (vocab, model) = fixture();
        let mut checkpoint = Checkpoint::new(&vocab, &model);
        checkpoint.config.hidden_size = 7;
        assert!(matches!(
            checkpoint.into_parts(),
            Err(ChargenError::InvalidInput(_))
        ));
    }
}
