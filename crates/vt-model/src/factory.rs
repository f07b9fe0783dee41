use vt_types::{Device, ModelError, VtResult};

use crate::config::{CaptionModel, ModelConfig};
use crate::hub::PretrainedResolver;
use crate::preprocessor::{FramePreprocessor, DEFAULT_FRAMES_PER_VIDEO};
use crate::tokens::SpecialTokens;

pub const DEFAULT_ENCODER: &str = "facebook/timesformer-base-finetuned-k600";
pub const DEFAULT_DECODER: &str = "gpt2";

/// Builds fresh encoder-decoder instances, one per trial.
///
/// The factory captures everything a build needs up front: pretrained ids,
/// target device, special tokens, and the frame contract. `build` wires the
/// decoder start token to bos and padding to the aliased pad token, the
/// configuration a caption decoder needs before any fine-tuning step.
#[derive(Debug, Clone)]
pub struct ModelFactory {
    encoder: String,
    decoder: String,
    device: Device,
    special_tokens: SpecialTokens,
    preprocessor: FramePreprocessor,
}

impl ModelFactory {
    pub fn new(encoder: impl Into<String>, decoder: impl Into<String>, device: Device) -> Self {
        Self {
            encoder: encoder.into(),
            decoder: decoder.into(),
            device,
            special_tokens: SpecialTokens::gpt2().with_pad_aliased_to_eos(),
            preprocessor: FramePreprocessor::videomae_base(DEFAULT_FRAMES_PER_VIDEO),
        }
    }

    pub fn with_special_tokens(mut self, special_tokens: SpecialTokens) -> Self {
        self.special_tokens = special_tokens;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: FramePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    pub fn decoder(&self) -> &str {
        &self.decoder
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special_tokens
    }

    pub fn preprocessor(&self) -> &FramePreprocessor {
        &self.preprocessor
    }

    pub fn validate(&self) -> VtResult<()> {
        for id in [
            self.encoder.as_str(),
            self.decoder.as_str(),
            self.preprocessor.image_processor.as_str(),
        ] {
            validate_identifier(id)?;
        }
        if self.preprocessor.num_frames == 0 {
            return Err(ModelError::InvalidConfig {
                message: "frames per video must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Assemble a fresh model instance.
    pub fn build(&self) -> VtResult<CaptionModel> {
        self.validate()?;
        let pad_token_id = self.special_tokens.require_pad()?;

        let config = ModelConfig {
            encoder: self.encoder.clone(),
            decoder: self.decoder.clone(),
            image_processor: self.preprocessor.image_processor.clone(),
            frames_per_video: self.preprocessor.num_frames,
            decoder_start_token_id: self.special_tokens.bos_token_id,
            pad_token_id,
            eos_token_id: self.special_tokens.eos_token_id,
        };

        let model = CaptionModel::new(config, self.device);
        tracing::debug!("Built model instance {} on {}", model.id, model.device);
        Ok(model)
    }

    /// Like [`build`](Self::build), but first requires every pretrained
    /// snapshot to be present in the local cache.
    pub fn build_with_assets(&self, resolver: &PretrainedResolver) -> VtResult<CaptionModel> {
        for id in [
            self.encoder.as_str(),
            self.decoder.as_str(),
            self.preprocessor.image_processor.as_str(),
        ] {
            resolver.require(id)?;
        }
        self.build()
    }
}

impl Default for ModelFactory {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODER, DEFAULT_DECODER, Device::Cpu)
    }
}

fn validate_identifier(id: &str) -> VtResult<()> {
    if id.is_empty() {
        return Err(ModelError::InvalidIdentifier {
            id: id.to_string(),
            message: "identifier is empty".to_string(),
        }
        .into());
    }
    if id.chars().any(char::is_whitespace) {
        return Err(ModelError::InvalidIdentifier {
            id: id.to_string(),
            message: "identifier contains whitespace".to_string(),
        }
        .into());
    }
    if id.matches('/').count() > 1 {
        return Err(ModelError::InvalidIdentifier {
            id: id.to_string(),
            message: "identifier has more than one path segment".to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_wires_special_tokens() {
        let factory = ModelFactory::new(DEFAULT_ENCODER, DEFAULT_DECODER, Device::Cpu);
        let model = factory.build().unwrap();

        let tokens = factory.special_tokens();
        assert_eq!(model.config.decoder_start_token_id, tokens.bos_token_id);
        assert_eq!(model.config.pad_token_id, tokens.eos_token_id);
        assert_eq!(model.config.frames_per_video, 8);
        assert_eq!(model.device, Device::Cpu);
    }

    #[test]
    fn test_each_build_is_fresh() {
        let factory = ModelFactory::default();
        let mut a = factory.build().unwrap();
        let b = factory.build().unwrap();
        assert_ne!(a.id, b.id);

        // Instances own their configuration.
        a.config.decoder_start_token_id = 0;
        assert_ne!(b.config.decoder_start_token_id, 0);
    }

    #[test]
    fn test_build_requires_pad_token() {
        let factory =
            ModelFactory::default().with_special_tokens(SpecialTokens::gpt2());
        match factory.build().unwrap_err() {
            vt_types::VtError::Model(ModelError::MissingSpecialToken { token }) => {
                assert_eq!(token, "pad");
            }
            other => panic!("Expected MissingSpecialToken, got: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let factory = ModelFactory::new("bad id with spaces", DEFAULT_DECODER, Device::Cpu);
        assert!(factory.build().is_err());

        let factory = ModelFactory::new("a/b/c", DEFAULT_DECODER, Device::Cpu);
        assert!(factory.build().is_err());
    }

    #[test]
    fn test_build_with_assets() {
        let dir = TempDir::new().unwrap();
        let resolver = PretrainedResolver::with_root(dir.path());
        let factory = ModelFactory::default();

        // Nothing cached yet.
        assert!(factory.build_with_assets(&resolver).is_err());

        for id in [
            DEFAULT_ENCODER,
            DEFAULT_DECODER,
            crate::preprocessor::VIDEOMAE_BASE,
        ] {
            std::fs::create_dir_all(resolver.snapshot_dir(id)).unwrap();
        }
        assert!(factory.build_with_assets(&resolver).is_ok());
    }
}
