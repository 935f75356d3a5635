//! Version command implementation.

use crate::style::banner::print_version_banner;
use crate::style::print_labeled;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_BIN_NAME");

pub fn run() {
    print_version_banner(NAME, VERSION);
    print_labeled("Target", std::env::consts::ARCH);
    print_labeled("OS", std::env::consts::OS);
    print_labeled(
        "Operators",
        &echo_abac::operators::OperatorRegistry::standard().names().join(", "),
    );
}
