mod helpers;
mod identity_flow;
mod lifecycle;
