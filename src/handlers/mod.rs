// handlers/mod.rs - HTTP handlers grouped by route family
//
// root       → GET /, GET /health
// migration  → /<entity>-migration/* (one set of handlers for every entity)
// scheduler  → /migration-scheduler/*
// data       → /api/data/:entity[/:id]

pub mod data;
pub mod migration;
pub mod root;
pub mod scheduler;
