// SPDX-FileCopyrightText: Copyright (c) 2025 The ectrans authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::ConfigError;

/// Parameters of a convertible erasure code `(k_i, m_i) -> (k_f, m_f)` and
/// the constants derived from them.
///
/// A stripe group always merges `lambda_i` pre-transition stripes into
/// `lambda_f` post-transition stripes, where
/// `lambda_i = lcm(k_i, k_f) / k_i` and `lambda_f = lcm(k_i, k_f) / k_f`.
/// The parity-merging path additionally requires `lambda_f == 1`
/// (equivalently `beta == 0`) and `m_f <= m_i`; re-encoding has no such
/// restriction.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertibleCode {
    pub k_i: u8,
    pub m_i: u8,
    pub n_i: u8,
    pub k_f: u8,
    pub m_f: u8,
    pub n_f: u8,
    /// `k_f = alpha * k_i + beta`
    pub alpha: u8,
    pub beta: u8,
    /// `lcm(k_i, k_f)`
    pub theta: u32,
    pub lambda_i: u32,
    pub lambda_f: u32,
}

impl ConvertibleCode {
    pub fn new(k_i: u8, m_i: u8, k_f: u8, m_f: u8) -> Result<Self, ConfigError> {
        if k_i == 0 || m_i == 0 || k_f == 0 || m_f == 0 {
            return Err(ConfigError::ZeroCodeParameter { k_i, m_i, k_f, m_f });
        }
        // Stripe widths must themselves fit in a block index.
        let n_i = u16::from(k_i) + u16::from(m_i);
        let n_f = u16::from(k_f) + u16::from(m_f);
        if n_i > u16::from(u8::MAX) || n_f > u16::from(u8::MAX) {
            return Err(ConfigError::StripeWidthOverflow { k_i, m_i, k_f, m_f });
        }

        let theta = lcm(u32::from(k_i), u32::from(k_f));
        Ok(Self {
            k_i,
            m_i,
            n_i: n_i as u8,
            k_f,
            m_f,
            n_f: n_f as u8,
            alpha: k_f / k_i,
            beta: k_f % k_i,
            theta,
            lambda_i: theta / u32::from(k_i),
            lambda_f: theta / u32::from(k_f),
        })
    }

    /// Whether the code supports the parity-merging transition path.
    ///
    /// Merging combines `alpha` same-offset parity blocks into one new
    /// parity block, which is only algebraically possible when `k_f` is an
    /// integer multiple of `k_i` and no new parity indices are introduced.
    pub fn is_merge_eligible(&self) -> bool {
        self.beta == 0 && self.m_f <= self.m_i
    }

    /// Validates eligibility for parity merging, for call sites that must
    /// reject ineligible codes before planning starts.
    pub fn require_merge_eligible(&self) -> Result<(), ConfigError> {
        if self.is_merge_eligible() {
            Ok(())
        } else {
            Err(ConfigError::NotMergeEligible {
                k_i: self.k_i,
                m_i: self.m_i,
                k_f: self.k_f,
                m_f: self.m_f,
            })
        }
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u32, b: u32) -> u32 {
    a / gcd(a, b) * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants() {
        let code = ConvertibleCode::new(3, 2, 6, 2).expect("valid code");
        assert_eq!(code.n_i, 5);
        assert_eq!(code.n_f, 8);
        assert_eq!(code.alpha, 2);
        assert_eq!(code.beta, 0);
        assert_eq!(code.theta, 6);
        assert_eq!(code.lambda_i, 2);
        assert_eq!(code.lambda_f, 1);
        assert!(code.is_merge_eligible());
    }

    #[test]
    fn test_lambda_identities() {
        for (k_i, k_f) in [(2u8, 4u8), (3, 6), (4, 6), (3, 5), (6, 9), (2, 8)] {
            let code = ConvertibleCode::new(k_i, 2, k_f, 2).expect("valid code");
            assert_eq!(code.lambda_i, code.theta / u32::from(k_i));
            assert_eq!(
                code.lambda_i * u32::from(code.k_i),
                code.lambda_f * u32::from(code.k_f)
            );
        }
    }

    #[test]
    fn test_non_multiple_not_merge_eligible() {
        let code = ConvertibleCode::new(3, 2, 5, 2).expect("valid code");
        assert!(!code.is_merge_eligible());
        assert!(code.require_merge_eligible().is_err());
    }

    #[test]
    fn test_more_final_parities_not_merge_eligible() {
        let code = ConvertibleCode::new(3, 2, 6, 3).expect("valid code");
        assert!(!code.is_merge_eligible());
    }

    #[test]
    fn test_oversized_stripe_width_rejected() {
        assert!(matches!(
            ConvertibleCode::new(200, 100, 200, 100),
            Err(ConfigError::StripeWidthOverflow { .. })
        ));
        assert!(matches!(
            ConvertibleCode::new(3, 2, 6, 250),
            Err(ConfigError::StripeWidthOverflow { .. })
        ));
        // 255 blocks exactly still fits.
        assert!(ConvertibleCode::new(128, 127, 128, 127).is_ok());
    }

    #[test]
    fn test_zero_parameter_rejected() {
        assert!(ConvertibleCode::new(0, 2, 6, 2).is_err());
        assert!(ConvertibleCode::new(3, 0, 6, 2).is_err());
        assert!(ConvertibleCode::new(3, 2, 0, 2).is_err());
        assert!(ConvertibleCode::new(3, 2, 6, 0).is_err());
    }
}
