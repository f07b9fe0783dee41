use serde::{Deserialize, Serialize};
use vt_types::{ModelError, VtResult};

pub const GPT2_VOCAB_SIZE: usize = 50257;
pub const GPT2_BOS_TOKEN_ID: i64 = 50256;
pub const GPT2_EOS_TOKEN_ID: i64 = 50256;

/// Special token ids of the decoder tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub bos_token_id: i64,
    pub eos_token_id: i64,
    pub pad_token_id: Option<i64>,
}

impl SpecialTokens {
    pub fn new(bos_token_id: i64, eos_token_id: i64, pad_token_id: Option<i64>) -> Self {
        Self {
            bos_token_id,
            eos_token_id,
            pad_token_id,
        }
    }

    /// GPT-2 ships a single `<|endoftext|>` token for bos and eos, and no
    /// pad token at all.
    pub fn gpt2() -> Self {
        Self::new(GPT2_BOS_TOKEN_ID, GPT2_EOS_TOKEN_ID, None)
    }

    /// Reuse the end-of-sequence token as padding.
    pub fn with_pad_aliased_to_eos(mut self) -> Self {
        self.pad_token_id = Some(self.eos_token_id);
        self
    }

    pub fn require_pad(&self) -> VtResult<i64> {
        self.pad_token_id.ok_or_else(|| {
            ModelError::MissingSpecialToken {
                token: "pad".to_string(),
            }
            .into()
        })
    }
}
