mod helpers;

mod paths_tests;
