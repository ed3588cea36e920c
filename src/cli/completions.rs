use clap::Parser;

/// Arguments for completions command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                  Generate bash completions:\n    chainroll completions bash > ~/.bash_completion.d/chainroll\n\n\
                  Generate zsh completions:\n    chainroll completions zsh > ~/.zfunc/_chainroll\n\n\
                  Generate fish completions:\n    chainroll completions fish > ~/.config/fish/completions/chainroll.fish")]
pub struct CompletionsArgs {
    /// Shell type (bash, elvish, fish, powershell, zsh)
    pub shell: String,
}
