pub mod chunker;
pub mod disclosure;
pub mod embedder;
pub mod hybrid;
pub mod indexer;
pub mod searcher;
pub mod store;

pub use chunker::{Chunker, TextChunk};
pub use disclosure::{ChunkDetail, RetrievalSurface, SearchHit, SearchSummary};
pub use embedder::{create_embedder, Embedder, OllamaEmbedder, ProviderHealth};
pub use hybrid::{MatchType, SearchResult};
pub use indexer::{IndexStats, Indexer};
pub use searcher::{SearchOptions, Searcher};
pub use store::{Chunk, ChunkRecord, ChunkStore, SqliteStore, StoreStats};
