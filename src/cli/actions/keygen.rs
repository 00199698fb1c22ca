use base64ct::{Base64, Encoding};

use crate::token::TokenMaker;

/// Fresh token key in the encoding `--token-key` expects.
#[must_use]
pub fn execute() -> String {
    Base64::encode_string(&TokenMaker::generate_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::KEY_LENGTH;

    #[test]
    fn keygen_output_decodes_to_a_key() -> anyhow::Result<()> {
        let encoded = execute();
        let key = Base64::decode_vec(&encoded).map_err(|err| anyhow::anyhow!("{err}"))?;
        assert_eq!(key.len(), KEY_LENGTH);
        Ok(())
    }
}
