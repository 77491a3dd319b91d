pub mod classifier;
pub mod locator;
pub mod prompts;
pub mod resolver;
pub mod terms;

pub use classifier::DocumentClassifier;
pub use locator::ResultsPageLocator;
pub use resolver::SiteResolver;
