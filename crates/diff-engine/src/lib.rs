pub mod lockfile;
pub mod npm;
pub mod overrides;
pub mod prefetch;
pub mod reifier;
pub mod resolver;
pub mod tree;
pub mod walk;

pub use npm::{NpmResolver, NpmResolverFactory};
pub use prefetch::{NoPrefetch, NpmCachePrefetcher, Prefetcher};
pub use reifier::{DryRunReifier, EffectGate};
pub use resolver::{Operation, Reified, ReifyOptions, Resolver, ResolverFactory};
pub use tree::{DiffAction, DiffNode, DiffTree, NodeId, TreeNode};
pub use walk::{collect_effects, to_repo_url};
