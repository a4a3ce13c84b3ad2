//! Frame loop tests against scripted collaborators

mod fixtures;
mod scenarios;
