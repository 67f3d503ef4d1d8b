use super::asset::StellarAsset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Base reserve of the reference network, in native units.
pub const DEFAULT_BASE_RESERVE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// One row per asset held by the tracked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
	pub asset: StellarAsset,
	pub balance: Decimal,
	/// Reserve that must stay locked to keep the asset open.
	pub min_balance: Decimal,
}

impl AssetBalance {
	pub fn new(
		asset: StellarAsset,
		balance: Decimal,
		subentry_count: u32,
		base_reserve: Decimal,
	) -> Self {
		let min_balance = min_balance(&asset, subentry_count, base_reserve);
		Self {
			asset,
			balance,
			min_balance,
		}
	}

	/// Balance that can be spent without touching the reserve.
	pub fn available(&self) -> Decimal {
		self.balance - self.min_balance
	}
}

/// `(2 + subentries) * base_reserve` for the native asset, zero for everything else.
pub fn min_balance(asset: &StellarAsset, subentry_count: u32, base_reserve: Decimal) -> Decimal {
	match asset {
		StellarAsset::Native => (Decimal::TWO + Decimal::from(subentry_count)) * base_reserve,
		StellarAsset::Asset { .. } => Decimal::ZERO,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	#[test]
	fn test_default_base_reserve_is_half() {
		assert_eq!(DEFAULT_BASE_RESERVE, Decimal::from_str("0.5").unwrap());
	}

	#[test]
	fn test_native_reserve_scales_with_subentries() {
		let native = AssetBalance::new(
			StellarAsset::Native,
			Decimal::from(100),
			3,
			DEFAULT_BASE_RESERVE,
		);
		assert_eq!(native.min_balance, Decimal::from_str("2.5").unwrap());
		assert_eq!(native.available(), Decimal::from_str("97.5").unwrap());
	}

	#[test]
	fn test_issued_assets_have_no_reserve() {
		let usdc = AssetBalance::new(
			StellarAsset::asset("USDC", "GISSUER"),
			Decimal::from(10),
			7,
			DEFAULT_BASE_RESERVE,
		);
		assert_eq!(usdc.min_balance, Decimal::ZERO);
	}
}
