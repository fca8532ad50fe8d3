pub mod caching {
    pub mod cacheregistry;
    pub mod cachestats;
    pub mod inflightslot;
    pub mod memoizingcache;
    pub mod memoizingvalue;
}

pub mod configuration;
pub mod configurationerror;

pub mod integration {
    pub mod integrationsettings;
    pub mod bracketsearch;
    pub mod integrationstats;
    pub mod adaptivequadrature;
    pub mod integrationcontext;
}

pub mod objectwithuuid;
