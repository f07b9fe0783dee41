use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vt_types::Device;

/// Assembled configuration of one encoder-decoder caption model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub encoder: String,
    pub decoder: String,
    pub image_processor: String,
    pub frames_per_video: usize,
    pub decoder_start_token_id: i64,
    pub pad_token_id: i64,
    pub eos_token_id: i64,
}

/// One model instance bound to a device.
///
/// Every trial builds a fresh instance so no optimizer or weight state leaks
/// between trials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionModel {
    pub id: Uuid,
    pub config: ModelConfig,
    pub device: Device,
    pub created_at: DateTime<Utc>,
}

impl CaptionModel {
    pub fn new(config: ModelConfig, device: Device) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            device,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ModelConfig {
        ModelConfig {
            encoder: "facebook/timesformer-base-finetuned-k600".to_string(),
            decoder: "gpt2".to_string(),
            image_processor: "MCG-NJU/videomae-base".to_string(),
            frames_per_video: 8,
            decoder_start_token_id: 50256,
            pad_token_id: 50256,
            eos_token_id: 50256,
        }
    }

    #[test]
    fn test_instances_are_distinct() {
        let a = CaptionModel::new(sample_config(), Device::Cpu);
        let b = CaptionModel::new(sample_config(), Device::Cpu);
        assert_ne!(a.id, b.id);
        assert_eq!(a.config, b.config);
    }

    #[test]
    fn test_config_serializes() {
        let model = CaptionModel::new(sample_config(), Device::Cuda(0));
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("timesformer"));
        let back: CaptionModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, model.id);
    }
}
