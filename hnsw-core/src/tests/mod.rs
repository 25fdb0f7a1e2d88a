//! Larger-scenario and property-based test support, mirroring the
//! teacher's own `src/tests/{datasets,fixtures}` split but fully offline —
//! no network-fetched SIFT corpus, only seeded synthetic generators.

mod scenarios;
