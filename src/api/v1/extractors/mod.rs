/*!
 * Extractors
 *
 * Public API:
 * - VerifiedDpopExtractor
 */
mod verified_dpop;

pub use verified_dpop::VerifiedDpopExtractor;
