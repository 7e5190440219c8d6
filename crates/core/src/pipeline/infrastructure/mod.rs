pub mod context_factory;
