//! Ciphertext and plaintext containers

use serde::{Deserialize, Serialize};

use crate::error::{config_err, Error};
use crate::math::{NttContext, Poly};
use crate::scheme::Level;

/// BFV ciphertext: `rank` polynomials over the moduli of one level.
///
/// Decrypts as `c_0 + c_1·s + c_2·s^2 + ...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Poly>", into = "Vec<Poly>")]
pub struct Ciphertext {
    polys: Vec<Poly>,
}

impl Ciphertext {
    /// Ciphertext from polynomials sharing moduli and domain
    pub fn from_polys(polys: Vec<Poly>) -> Self {
        assert!(polys.len() >= 2, "Ciphertext needs at least two polynomials");
        let first = &polys[0];
        for p in &polys[1..] {
            assert_eq!(p.moduli(), first.moduli(), "Moduli must match");
            assert_eq!(p.is_ntt(), first.is_ntt(), "NTT domains must match");
        }
        Self { polys }
    }

    pub fn polys(&self) -> &[Poly] {
        &self.polys
    }

    pub fn polys_mut(&mut self) -> &mut [Poly] {
        &mut self.polys
    }

    pub fn into_polys(self) -> Vec<Poly> {
        self.polys
    }

    /// Append an encryption-of-zero component, used when adding ciphertexts of different rank
    pub(crate) fn push_zero(&mut self, ntt: &NttContext) {
        let template = &self.polys[0];
        let mut zero = Poly::zero(template.dimension(), template.moduli());
        if template.is_ntt() {
            zero.to_ntt(ntt);
        }
        self.polys.push(zero);
    }

    /// Number of polynomials
    pub fn rank(&self) -> usize {
        self.polys.len()
    }

    pub fn level(&self) -> Level {
        Level::new(self.polys[0].limb_count() - 1)
    }

    pub fn is_ntt(&self) -> bool {
        self.polys[0].is_ntt()
    }

    pub fn ring_dim(&self) -> usize {
        self.polys[0].dimension()
    }

    pub fn moduli(&self) -> &[u64] {
        self.polys[0].moduli()
    }
}

impl TryFrom<Vec<Poly>> for Ciphertext {
    type Error = Error;

    fn try_from(polys: Vec<Poly>) -> Result<Self, Error> {
        if polys.len() < 2 {
            return Err(config_err!(
                "ciphertext needs at least two polynomials, got {}",
                polys.len()
            ));
        }
        if !polys.iter().all(Poly::is_well_formed) {
            return Err(config_err!("malformed ciphertext polynomial"));
        }
        let first = &polys[0];
        let consistent = polys[1..].iter().all(|p| {
            p.moduli() == first.moduli()
                && p.is_ntt() == first.is_ntt()
                && p.dimension() == first.dimension()
        });
        if !consistent {
            return Err(config_err!("ciphertext polynomials disagree on moduli or domain"));
        }
        Ok(Self { polys })
    }
}

impl From<Ciphertext> for Vec<Poly> {
    fn from(ct: Ciphertext) -> Self {
        ct.polys
    }
}

/// BFV plaintext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plaintext {
    /// N coefficients in `[0, t)`
    Coeff(Vec<u64>),
    /// Centered lift of a coefficient plaintext, in NTT form for one level
    Ntt { level: Level, poly: Poly },
}

impl Plaintext {
    /// NTT level, `None` for coefficient plaintexts
    pub fn ntt_level(&self) -> Option<Level> {
        match self {
            Plaintext::Coeff(_) => None,
            Plaintext::Ntt { level, .. } => Some(*level),
        }
    }

    /// Whether only the constant coefficient can be nonzero
    pub fn is_constant(&self) -> bool {
        match self {
            Plaintext::Coeff(c) => c.iter().skip(1).all(|&v| v == 0),
            Plaintext::Ntt { .. } => false,
        }
    }
}
