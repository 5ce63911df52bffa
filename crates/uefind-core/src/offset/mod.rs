mod collection;
mod hex;
mod list;
mod locator;
mod resolver;
mod signature;

pub use collection::ResolvedGlobals;
pub use hex::{format_hex_address, parse_hex_address};
pub use list::{FORMAT_VERSION, GameInfo, OffsetEntry, OffsetList, RELATIVE_SPAN};
pub use locator::GlobalLocator;
pub use resolver::{DISPLACEMENT_OFFSET, INSTRUCTION_LEN, InstructionOffsetResolver};
pub use signature::{
    BUILTIN_VERSION, ClassSignatures, Signature, SignatureDef, SignatureFile, SignatureTable,
    TargetClass, load_signatures, save_signatures,
};
