mod common;
mod gateway_cloud;
mod gateway_rest;
mod node;
