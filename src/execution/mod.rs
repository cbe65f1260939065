// Execution - Machinerie d'exécution déterministe
// Principe: tout accès est mesuré, rien n'est publié hors de la réponse

pub mod classpath;
pub mod codec;
pub mod deserializer;
pub mod gas;
pub mod heap;
pub mod native;
pub mod sandbox;
pub mod updates;
pub mod verifier;

pub use classpath::{Classpath, ClasspathError, LoadedClass};
pub use codec::{check_type, to_runtime, to_storage, CodecError, RuntimeValue};
pub use deserializer::{persisted_state, DeserializationError, ObjectDeserializer, PersistedObject};
pub use gas::{costs, GasCostModel, GasDimension, GasError, GasMeter, StandardGasCostModel};
pub use heap::{Heap, Origin, RuntimeObject, Snapshot};
pub use native::{base_code, NativeExecutor, NativeHandler};
pub use sandbox::{ExecutionOutcome, Executor, Invocation, Sandbox, SandboxError};
pub use updates::{UpdateError, UpdateSetComputer};
pub use verifier::{ManifestVerifier, VerificationError, Verifier, SUPPORTED_VERIFICATION_VERSION};
