/*
 * Responsibility
 * - Public surface of the middleware layer
 */
pub mod dpop;
pub mod http;
