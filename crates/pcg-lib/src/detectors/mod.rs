pub mod pcg;
