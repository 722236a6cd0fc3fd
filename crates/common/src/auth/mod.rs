//! Proof of key possession.
//!
//! Two mechanisms live here:
//!
//! - [`ChallengeAuthenticator`]: stateful, single-use nonces that a peer
//!   signs to prove it holds the secret behind a public key
//! - [`Token`]: stateless, time-bound bearer credentials verifiable with
//!   nothing but the embedded public key

mod challenge;
mod token;

pub use challenge::{
    Challenge, ChallengeAuthenticator, ChallengeError, ChallengeId, Nonce, CHALLENGE_TTL,
    NONCE_SIZE,
};
pub use token::{Token, TokenError, TokenPayload, DEFAULT_TOKEN_TTL};
