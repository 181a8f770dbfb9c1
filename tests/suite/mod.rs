mod diagnostics;
mod features;
mod lifecycle;
mod reload;
