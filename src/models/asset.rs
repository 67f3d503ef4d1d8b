//! Asset identity as seen by the tracked account.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used for the native asset in persisted keys and tag rows.
pub const NATIVE_ASSET_ID: &str = "native";

/// A ledger asset: either the native asset or an issued `(code, issuer)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StellarAsset {
	Native,
	Asset { code: String, issuer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid asset id: {0}")]
pub struct InvalidAssetId(pub String);

impl StellarAsset {
	pub fn asset(code: impl Into<String>, issuer: impl Into<String>) -> Self {
		StellarAsset::Asset {
			code: code.into(),
			issuer: issuer.into(),
		}
	}

	/// Stable identity string: `native` or `CODE:ISSUER`.
	pub fn id(&self) -> String {
		match self {
			StellarAsset::Native => NATIVE_ASSET_ID.to_string(),
			StellarAsset::Asset { code, issuer } => format!("{}:{}", code, issuer),
		}
	}

	/// Parse an identity string produced by [`StellarAsset::id`].
	pub fn from_id(id: &str) -> Result<Self, InvalidAssetId> {
		if id == NATIVE_ASSET_ID {
			return Ok(StellarAsset::Native);
		}

		match id.split_once(':') {
			Some((code, issuer))
				if !code.is_empty() && !issuer.is_empty() && !issuer.contains(':') =>
			{
				Ok(StellarAsset::asset(code, issuer))
			}
			_ => Err(InvalidAssetId(id.to_string())),
		}
	}

	/// Build an asset from the `asset_type`/`asset_code`/`asset_issuer` triple used by Horizon.
	///
	/// Returns `None` for types that cannot be expressed as an asset (liquidity pool shares)
	/// or when an issued asset is missing its code or issuer.
	pub fn from_horizon(
		asset_type: &str,
		asset_code: Option<&str>,
		asset_issuer: Option<&str>,
	) -> Option<Self> {
		match asset_type {
			"native" => Some(StellarAsset::Native),
			"credit_alphanum4" | "credit_alphanum12" => match (asset_code, asset_issuer) {
				(Some(code), Some(issuer)) => Some(StellarAsset::asset(code, issuer)),
				_ => None,
			},
			_ => None,
		}
	}

	pub fn is_native(&self) -> bool {
		matches!(self, StellarAsset::Native)
	}
}

impl fmt::Display for StellarAsset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.id())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_id_and_parse() {
		let usdc = StellarAsset::asset("USDC", "GISSUER");
		assert_eq!(usdc.id(), "USDC:GISSUER");
		assert_eq!(StellarAsset::from_id("USDC:GISSUER"), Ok(usdc));
		assert_eq!(StellarAsset::from_id("native"), Ok(StellarAsset::Native));
	}

	#[test]
	fn test_rejects_malformed_ids() {
		assert!(StellarAsset::from_id("").is_err());
		assert!(StellarAsset::from_id("USDC").is_err());
		assert!(StellarAsset::from_id(":GISSUER").is_err());
		assert!(StellarAsset::from_id("USDC:").is_err());
		assert!(StellarAsset::from_id("A:B:C").is_err());
	}

	#[test]
	fn test_equality_requires_both_fields() {
		assert_ne!(
			StellarAsset::asset("USDC", "GONE"),
			StellarAsset::asset("USDC", "GTWO")
		);
		assert_ne!(StellarAsset::Native, StellarAsset::asset("XLM", "GONE"));
	}

	#[test]
	fn test_from_horizon() {
		assert_eq!(
			StellarAsset::from_horizon("native", None, None),
			Some(StellarAsset::Native)
		);
		assert_eq!(
			StellarAsset::from_horizon("credit_alphanum12", Some("LONGCODE"), Some("GI")),
			Some(StellarAsset::asset("LONGCODE", "GI"))
		);
		assert_eq!(
			StellarAsset::from_horizon("liquidity_pool_shares", None, None),
			None
		);
		assert_eq!(
			StellarAsset::from_horizon("credit_alphanum4", Some("USD"), None),
			None
		);
	}
}
