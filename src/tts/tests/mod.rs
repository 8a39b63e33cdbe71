mod helpers;
mod speaker;
