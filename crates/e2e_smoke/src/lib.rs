// Intentionally empty: this package only carries the end-to-end test in
// tests/smoke.rs.
