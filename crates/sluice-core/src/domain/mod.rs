//! Domain layer - run records, elements, statuses, and the persistence seams

/// Run and element records with their status state machine
pub mod flow_run;

/// Store and queue traits
pub mod repository;
